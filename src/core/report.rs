//! Monthly report generation.
//!
//! Pure functions over the current collections: month totals, per-account
//! activity, top categories and a few insight lines, plus a plain-text
//! email rendering. No I/O here; dispatch lives in the notify layer.

use chrono::{DateTime, Datelike, Utc};

use crate::entities::{Account, Category, Transaction, TransactionKind};

/// One category's share of the month.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryStat {
    pub name: String,
    pub amount: f64,
    pub count: usize,
    /// Share of the month's total expense, 0-100.
    pub percentage: f64,
}

/// Per-account income/expense within the month.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountActivity {
    pub name: String,
    pub income: f64,
    pub expense: f64,
}

/// Structured month summary, ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyReport {
    /// English month name, e.g. `"August"`.
    pub month: String,
    pub year: i32,
    pub total_income: f64,
    pub total_expense: f64,
    pub net_balance: f64,
    pub transaction_count: usize,
    pub account_count: usize,
    pub account_activity: Vec<AccountActivity>,
    /// At most the five largest categories by amount.
    pub top_categories: Vec<CategoryStat>,
    pub insights: Vec<String>,
}

fn same_month(date: &DateTime<Utc>, target: &DateTime<Utc>) -> bool {
    date.year() == target.year() && date.month() == target.month()
}

/// Builds the report for the calendar month containing `target`.
pub fn generate_monthly_report(
    transactions: &[Transaction],
    accounts: &[Account],
    categories: &[Category],
    target: DateTime<Utc>,
) -> MonthlyReport {
    let month_trxs: Vec<&Transaction> = transactions
        .iter()
        .filter(|t| same_month(&t.date, &target))
        .collect();

    let total_income: f64 = month_trxs
        .iter()
        .filter(|t| t.kind == TransactionKind::Income)
        .map(|t| t.amount)
        .sum();
    let total_expense: f64 = month_trxs
        .iter()
        .filter(|t| t.kind == TransactionKind::Expense)
        .map(|t| t.amount)
        .sum();
    let net_balance = total_income - total_expense;

    let account_activity = accounts
        .iter()
        .map(|account| {
            let (mut income, mut expense) = (0.0, 0.0);
            for trx in month_trxs.iter().filter(|t| t.account_id == account.id) {
                match trx.kind {
                    TransactionKind::Income => income += trx.amount,
                    TransactionKind::Expense => expense += trx.amount,
                }
            }
            AccountActivity {
                name: account.name.clone(),
                income,
                expense,
            }
        })
        .collect();

    let mut top_categories: Vec<CategoryStat> = categories
        .iter()
        .map(|category| {
            let matching: Vec<&&Transaction> = month_trxs
                .iter()
                .filter(|t| t.category == category.name)
                .collect();
            let amount: f64 = matching.iter().map(|t| t.amount).sum();
            CategoryStat {
                name: category.name.clone(),
                amount,
                count: matching.len(),
                percentage: if total_expense > 0.0 {
                    amount / total_expense * 100.0
                } else {
                    0.0
                },
            }
        })
        .filter(|stat| stat.count > 0)
        .collect();
    top_categories.sort_by(|a, b| b.amount.total_cmp(&a.amount));
    top_categories.truncate(5);

    let mut insights = Vec::new();
    if net_balance >= 0.0 {
        insights.push(format!("Positive balance this month: ${net_balance:.2}"));
    } else {
        insights.push(format!(
            "Negative balance of ${:.2}; worth reviewing the biggest expenses",
            net_balance.abs()
        ));
    }
    if !month_trxs.is_empty() {
        let avg = (total_income + total_expense) / month_trxs.len() as f64;
        insights.push(format!("Average amount per transaction: ${avg:.2}"));
    }
    if let Some(top) = top_categories.first() {
        insights.push(format!(
            "Largest category: \"{}\" at ${:.2}",
            top.name, top.amount
        ));
    }
    if let Some(line) = previous_month_comparison(transactions, target, total_expense) {
        insights.push(line);
    }

    MonthlyReport {
        month: target.format("%B").to_string(),
        year: target.year(),
        total_income,
        total_expense,
        net_balance,
        transaction_count: month_trxs.len(),
        account_count: accounts.len(),
        account_activity,
        top_categories,
        insights,
    }
}

fn previous_month_comparison(
    transactions: &[Transaction],
    target: DateTime<Utc>,
    total_expense: f64,
) -> Option<String> {
    let (prev_year, prev_month) = if target.month() == 1 {
        (target.year() - 1, 12)
    } else {
        (target.year(), target.month() - 1)
    };
    let prev: Vec<&Transaction> = transactions
        .iter()
        .filter(|t| t.date.year() == prev_year && t.date.month() == prev_month)
        .collect();
    if prev.is_empty() {
        return None;
    }
    let prev_expense: f64 = prev
        .iter()
        .filter(|t| t.kind == TransactionKind::Expense)
        .map(|t| t.amount)
        .sum();
    if prev_expense <= 0.0 {
        return None;
    }
    if total_expense < prev_expense {
        let reduction = (prev_expense - total_expense) / prev_expense * 100.0;
        Some(format!(
            "Expenses down {reduction:.1}% from last month"
        ))
    } else if total_expense > prev_expense {
        let increase = (total_expense - prev_expense) / prev_expense * 100.0;
        Some(format!("Expenses up {increase:.1}% from last month"))
    } else {
        None
    }
}

/// Subject line for the report email.
pub fn email_subject(report: &MonthlyReport) -> String {
    format!("Monthly report - {} {}", report.month, report.year)
}

/// Plain-text email rendering of a report.
pub fn email_body(report: &MonthlyReport, recipient: &str) -> String {
    let mut body = String::new();
    body.push_str("MONTHLY FINANCE REPORT\n");
    body.push_str("======================\n");
    body.push_str(&format!("Period: {} {}\n", report.month, report.year));
    body.push_str(&format!("User: {recipient}\n\n"));

    body.push_str("SUMMARY\n-------\n");
    body.push_str(&format!("Total income:  ${:.2}\n", report.total_income));
    body.push_str(&format!("Total expense: ${:.2}\n", report.total_expense));
    body.push_str(&format!(
        "Net balance:   ${:.2} ({})\n",
        report.net_balance,
        if report.net_balance >= 0.0 {
            "positive"
        } else {
            "negative"
        }
    ));
    body.push_str(&format!("Transactions:  {}\n\n", report.transaction_count));

    body.push_str("ACCOUNTS\n--------\n");
    for activity in &report.account_activity {
        body.push_str(&format!(
            "{}: ${:.2} income, ${:.2} expense\n",
            activity.name, activity.income, activity.expense
        ));
    }

    body.push_str("\nTOP CATEGORIES\n--------------\n");
    for (index, stat) in report.top_categories.iter().enumerate() {
        body.push_str(&format!(
            "{}. {}: ${:.2} ({} transactions, {:.1}%)\n",
            index + 1,
            stat.name,
            stat.amount,
            stat.count,
            stat.percentage
        ));
    }

    body.push_str("\nINSIGHTS\n--------\n");
    for insight in &report.insights {
        body.push_str(&format!("- {insight}\n"));
    }
    body
}
