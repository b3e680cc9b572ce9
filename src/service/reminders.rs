use std::num::NonZeroU32;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Serialize;
use tracing::{error, info};

use crate::db::SettingsStore;
use crate::error::AppError;
use crate::logging::redact;
use crate::mail::{Mailer, PhotoAttachment, compose};
use crate::service::birthdays::BirthdayService;
use crate::service::calendar::Upcoming;
use crate::storage::photos::PUBLIC_PREFIX;
use crate::types::{Birthday, SmtpSettings};

const SEND_CONCURRENCY: usize = 2;
const ERROR_LIMIT: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub message: String,
    pub sent: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigestPreview {
    pub upcoming: Vec<Upcoming>,
    pub count: usize,
    pub period_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestOutcome {
    pub message: String,
    pub count: usize,
}

/// Sends reminder, digest and test emails through a [`Mailer`].
#[derive(Clone)]
pub struct ReminderService {
    birthdays: BirthdayService,
    settings: SettingsStore,
    mailer: Arc<dyn Mailer>,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl ReminderService {
    pub fn new(
        birthdays: BirthdayService,
        settings: SettingsStore,
        mailer: Arc<dyn Mailer>,
        per_minute: u32,
    ) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN));
        Self {
            birthdays,
            settings,
            mailer,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    async fn require_settings(&self) -> Result<SmtpSettings, AppError> {
        self.settings.load().await?.ok_or(AppError::SettingsMissing)
    }

    /// One reminder per birthday today. Individual failures are collected;
    /// when every send fails the first error is returned instead.
    pub async fn send_today(&self, today: NaiveDate) -> Result<DispatchReport, AppError> {
        let settings = self.require_settings().await?;
        let todays = self.birthdays.today(today).await?;
        if todays.is_empty() {
            return Ok(DispatchReport {
                message: "No birthdays today".to_string(),
                ..DispatchReport::default()
            });
        }

        let total = todays.len();
        let settings = Arc::new(settings);
        let outcomes: Vec<(Birthday, Result<(), AppError>)> = stream::iter(todays)
            .map(|view| {
                let lim = self.limiter.clone();
                let settings = settings.clone();
                async move {
                    lim.until_ready().await;
                    let birthday = view.birthday;
                    let photo = self.load_photo(&birthday).await;
                    let letter = compose::reminder(&birthday, today, photo);
                    let result = self
                        .mailer
                        .send(&settings, letter)
                        .await
                        .map_err(AppError::from);
                    (birthday, result)
                }
            })
            .buffer_unordered(SEND_CONCURRENCY)
            .collect()
            .await;

        let mut report = DispatchReport::default();
        let mut first_error = None;
        for (birthday, result) in outcomes {
            match result {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    report.failed += 1;
                    let detail = redact(&e.to_string());
                    error!(id = birthday.id, error = %detail, "failed to send reminder");
                    if report.errors.len() < ERROR_LIMIT {
                        report
                            .errors
                            .push(format!("Failed to send reminder for {}: {detail}", birthday.name));
                    }
                    first_error.get_or_insert(e);
                }
            }
        }

        if report.sent == 0
            && let Some(e) = first_error
        {
            return Err(e);
        }
        report.message = format!("Reminder emails sent for {} of {total} birthday(s)", report.sent);
        info!(sent = report.sent, failed = report.failed, "reminders dispatched");
        Ok(report)
    }

    pub async fn preview_digest(&self, today: NaiveDate, days: u32) -> Result<DigestPreview, AppError> {
        let upcoming = self.birthdays.upcoming(today, days).await?;
        Ok(DigestPreview {
            count: upcoming.len(),
            upcoming,
            period_days: days,
        })
    }

    pub async fn send_digest(&self, today: NaiveDate, days: u32) -> Result<DigestOutcome, AppError> {
        let settings = self.require_settings().await?;
        let upcoming = self.birthdays.upcoming(today, days).await?;
        if upcoming.is_empty() {
            return Ok(DigestOutcome {
                message: "No upcoming birthdays in the selected period".to_string(),
                count: 0,
            });
        }
        self.limiter.until_ready().await;
        self.mailer
            .send(&settings, compose::digest(&upcoming, days))
            .await?;
        info!(count = upcoming.len(), days, "digest sent");
        Ok(DigestOutcome {
            message: format!("Digest sent successfully with {} birthdays", upcoming.len()),
            count: upcoming.len(),
        })
    }

    pub async fn send_test(&self) -> Result<(), AppError> {
        let settings = self.require_settings().await?;
        self.mailer.send(&settings, compose::test_message()).await?;
        info!("test email sent");
        Ok(())
    }

    async fn load_photo(&self, birthday: &Birthday) -> Option<PhotoAttachment> {
        let public = birthday.photo.as_deref()?;
        match self.birthdays.photos().read(public).await {
            Ok(bytes) => Some(PhotoAttachment {
                file_name: public.strip_prefix(PUBLIC_PREFIX).unwrap_or(public).to_string(),
                bytes,
            }),
            Err(e) => {
                info!(id = birthday.id, error = %e, "reminder sent without photo");
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::{BirthdayStore, init_schema};
    use crate::mail::{Letter, MailError, SmtpFailure};
    use crate::storage::PhotoStore;
    use crate::types::NewBirthday;
    use async_trait::async_trait;
    use chrono::Utc;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    pub(crate) struct RecordingMailer {
        pub sent: Mutex<Vec<Letter>>,
        pub fail_with: Option<u16>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, _settings: &SmtpSettings, letter: Letter) -> Result<(), MailError> {
            if let Some(code) = self.fail_with {
                return Err(MailError::Smtp(SmtpFailure {
                    code: Some(code),
                    message: "rejected".into(),
                    transport: false,
                }));
            }
            self.sent.lock().unwrap().push(letter);
            Ok(())
        }
    }

    fn settings() -> SmtpSettings {
        SmtpSettings {
            server: "smtp.example.com".into(),
            port: 587,
            email: "me@example.com".into(),
            password: Some("pw".into()),
            recipient_email: "you@example.org".into(),
            google_client_id: None,
            google_client_secret: None,
            google_refresh_token: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn setup(mailer: Arc<RecordingMailer>, configured: bool) -> (ReminderService, BirthdayService, TempDir) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let birthdays = BirthdayService::new(
            BirthdayStore::new(pool.clone()),
            PhotoStore::new(dir.path().to_path_buf()),
        );
        let store = SettingsStore::new(pool);
        if configured {
            store.save(&settings()).await.unwrap();
        }
        let svc = ReminderService::new(birthdays.clone(), store, mailer, 6000);
        (svc, birthdays, dir)
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn unconfigured_settings_are_an_error() {
        let (svc, _, _dir) = setup(Arc::new(RecordingMailer::default()), false).await;
        assert!(matches!(svc.send_today(d(2024, 1, 1)).await, Err(AppError::SettingsMissing)));
        assert!(matches!(svc.send_test().await, Err(AppError::SettingsMissing)));
    }

    #[tokio::test]
    async fn sends_one_reminder_per_birthday_today() {
        let mailer = Arc::new(RecordingMailer::default());
        let (svc, birthdays, _dir) = setup(mailer.clone(), true).await;
        for (name, date) in [("A", "1990-06-01"), ("B", "1985-06-01"), ("C", "1985-06-02")] {
            birthdays
                .create(NewBirthday::parse(name, date, None).unwrap(), None)
                .await
                .unwrap();
        }

        let report = svc.send_today(d(2024, 6, 1)).await.unwrap();
        assert_eq!((report.sent, report.failed), (2, 0));
        let mut subjects: Vec<_> = mailer.sent.lock().unwrap().iter().map(|l| l.subject.clone()).collect();
        subjects.sort();
        assert_eq!(subjects, vec!["Birthday Reminder: A", "Birthday Reminder: B"]);

        let none = svc.send_today(d(2024, 6, 3)).await.unwrap();
        assert_eq!(none.message, "No birthdays today");
    }

    #[tokio::test]
    async fn total_failure_surfaces_the_mail_error() {
        let mailer = Arc::new(RecordingMailer {
            fail_with: Some(535),
            ..RecordingMailer::default()
        });
        let (svc, birthdays, _dir) = setup(mailer, true).await;
        birthdays
            .create(NewBirthday::parse("A", "1990-06-01", None).unwrap(), None)
            .await
            .unwrap();
        let err = svc.send_today(d(2024, 6, 1)).await.unwrap_err();
        assert!(matches!(err, AppError::Mail(MailError::Smtp(_))));
    }

    #[tokio::test]
    async fn digest_covers_window() {
        let mailer = Arc::new(RecordingMailer::default());
        let (svc, birthdays, _dir) = setup(mailer.clone(), true).await;
        birthdays
            .create(NewBirthday::parse("Near", "1990-06-03", None).unwrap(), None)
            .await
            .unwrap();
        birthdays
            .create(NewBirthday::parse("Far", "1990-08-01", None).unwrap(), None)
            .await
            .unwrap();

        let preview = svc.preview_digest(d(2024, 6, 1), 7).await.unwrap();
        assert_eq!(preview.count, 1);
        assert_eq!(preview.period_days, 7);

        let outcome = svc.send_digest(d(2024, 6, 1), 7).await.unwrap();
        assert_eq!(outcome.count, 1);
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent[0].subject, "Birthday Digest - Next 7 Days");
        assert!(sent[0].html().unwrap().contains("Near"));
        drop(sent);

        let empty = svc.send_digest(d(2024, 9, 1), 3).await.unwrap();
        assert_eq!(empty.count, 0);
    }
}
