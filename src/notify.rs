//! Notification dispatch.
//!
//! Email and push are external collaborators behind narrow traits, and both
//! are fire-and-forget from the core's point of view: the background
//! helpers spawn the send and log a failure without blocking or failing the
//! caller.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::core::report::{MonthlyReport, email_body, email_subject};
use crate::errors::Result;

/// Email collaborator.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Push-notification collaborator. Returns how many devices were reached.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, user_id: &str, title: &str, body: &str) -> Result<u32>;
}

/// Sends an email in the background; failures are logged only.
pub fn send_email_in_background(
    sender: Arc<dyn EmailSender>,
    to: String,
    subject: String,
    body: String,
) {
    tokio::spawn(async move {
        match sender.send(&to, &subject, &body).await {
            Ok(()) => debug!(to, subject, "email dispatched"),
            Err(err) => warn!(%err, to, "email dispatch failed"),
        }
    });
}

/// Sends a push notification in the background; failures are logged only.
pub fn send_push_in_background(
    sender: Arc<dyn PushSender>,
    user_id: String,
    title: String,
    body: String,
) {
    tokio::spawn(async move {
        match sender.send(&user_id, &title, &body).await {
            Ok(devices) => debug!(user_id, devices, "push dispatched"),
            Err(err) => warn!(%err, user_id, "push dispatch failed"),
        }
    });
}

/// Renders a monthly report and mails it in the background.
pub fn send_monthly_report(sender: Arc<dyn EmailSender>, report: &MonthlyReport, to: &str) {
    send_email_in_background(
        sender,
        to.to_string(),
        email_subject(report),
        email_body(report, to),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::report::generate_monthly_report;
    use crate::errors::Error;
    use crate::test_utils::wait_until;

    /// Records every message it is asked to send.
    #[derive(Debug, Default)]
    struct MemoryMailbox {
        messages: std::sync::Mutex<Vec<(String, String, String)>>,
        fail: std::sync::atomic::AtomicBool,
    }

    impl MemoryMailbox {
        fn new() -> Self {
            Self::default()
        }

        fn set_fail(&self, fail: bool) {
            self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
        }

        fn messages(&self) -> Vec<(String, String, String)> {
            self.messages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EmailSender for MemoryMailbox {
        async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(Error::Notify("simulated delivery failure".into()));
            }
            self.messages
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    /// Records every push and reports one device reached.
    #[derive(Debug, Default)]
    struct MemoryPush {
        notes: std::sync::Mutex<Vec<(String, String, String)>>,
    }

    impl MemoryPush {
        fn notes(&self) -> Vec<(String, String, String)> {
            self.notes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PushSender for MemoryPush {
        async fn send(&self, user_id: &str, title: &str, body: &str) -> Result<u32> {
            self.notes
                .lock()
                .unwrap()
                .push((user_id.to_string(), title.to_string(), body.to_string()));
            Ok(1)
        }
    }

    #[tokio::test]
    async fn background_push_is_delivered() {
        let push = Arc::new(MemoryPush::default());
        send_push_in_background(
            Arc::<MemoryPush>::clone(&push),
            "uid1".into(),
            "Reporte mensual".into(),
            "Tu resumen está listo".into(),
        );

        wait_until(|| push.notes().len() == 1).await;
        let (user, title, _) = push.notes().remove(0);
        assert_eq!(user, "uid1");
        assert_eq!(title, "Reporte mensual");
    }

    #[tokio::test]
    async fn background_email_is_delivered() {
        let mailbox = Arc::new(MemoryMailbox::new());
        send_email_in_background(
            Arc::<MemoryMailbox>::clone(&mailbox),
            "ana@example.com".into(),
            "Hello".into(),
            "Body".into(),
        );

        wait_until(|| mailbox.messages().len() == 1).await;
        let (to, subject, _) = mailbox.messages().remove(0);
        assert_eq!(to, "ana@example.com");
        assert_eq!(subject, "Hello");
    }

    #[tokio::test]
    async fn delivery_failure_does_not_propagate() {
        let mailbox = Arc::new(MemoryMailbox::new());
        mailbox.set_fail(true);
        // Nothing to assert beyond "no panic, nothing recorded".
        send_email_in_background(
            Arc::<MemoryMailbox>::clone(&mailbox),
            "ana@example.com".into(),
            "Hello".into(),
            "Body".into(),
        );
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(mailbox.messages().is_empty());
    }

    #[tokio::test]
    async fn monthly_report_email_carries_the_rendered_body() {
        let mailbox = Arc::new(MemoryMailbox::new());
        let report = generate_monthly_report(&[], &[], &[], chrono::Utc::now());
        send_monthly_report(
            Arc::<MemoryMailbox>::clone(&mailbox),
            &report,
            "ana@example.com",
        );

        wait_until(|| mailbox.messages().len() == 1).await;
        let (_, subject, body) = mailbox.messages().remove(0);
        assert!(subject.starts_with("Monthly report"));
        assert!(body.contains("MONTHLY FINANCE REPORT"));
    }
}
