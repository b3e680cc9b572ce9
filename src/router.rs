use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware::from_extractor_with_state,
    routing::{get, post},
};
use serde_json::{Value, json};

use crate::config::Config;
use crate::db::{BirthdayStore, SettingsStore, SqlitePool};
use crate::google_oauth::GoogleOauthService;
use crate::handlers::{birthdays, google_oauth, reminders, settings, transfer, uploads};
use crate::mail::Mailer;
use crate::middleware::RequireAccessKey;
use crate::service::{BirthdayService, ReminderService, TransferService};
use crate::storage::PhotoStore;

#[derive(Clone)]
pub struct AppState {
    pub birthdays: BirthdayService,
    pub transfer: TransferService,
    pub reminders: ReminderService,
    pub settings: SettingsStore,
    pub oauth: GoogleOauthService,
    pub access_key: Option<Arc<str>>,
    pub digest_days: u32,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        cfg: &Config,
        pool: SqlitePool,
        photos: PhotoStore,
        mailer: Arc<dyn Mailer>,
        oauth: GoogleOauthService,
    ) -> Self {
        let birthdays = BirthdayService::new(BirthdayStore::new(pool.clone()), photos);
        let settings = SettingsStore::new(pool);
        let reminders = ReminderService::new(
            birthdays.clone(),
            settings.clone(),
            mailer,
            cfg.reminders.per_minute,
        );
        Self {
            transfer: TransferService::new(birthdays.clone()),
            birthdays,
            reminders,
            settings,
            oauth,
            access_key: cfg.basic.access_key.as_deref().map(Arc::from),
            digest_days: cfg.reminders.digest_days,
            max_upload_bytes: cfg.basic.max_upload_bytes,
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

pub fn app_router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/birthdays",
            get(birthdays::list_birthdays).post(birthdays::create_birthday),
        )
        .route("/birthdays/today", get(birthdays::todays_birthdays))
        .route("/birthdays/upcoming30", get(birthdays::upcoming_birthdays))
        .route("/birthdays/duplicates", get(birthdays::find_duplicates))
        .route(
            "/birthdays/{id}",
            get(birthdays::get_birthday)
                .put(birthdays::update_birthday)
                .delete(birthdays::delete_birthday),
        )
        .route(
            "/config",
            get(settings::get_config).post(settings::save_config),
        )
        .route("/config/reset", post(settings::reset_config))
        .route("/oauth/device/init", post(google_oauth::device_init))
        .route("/oauth/device/poll", post(google_oauth::device_poll))
        .route("/test-email", post(reminders::send_test_email))
        .route("/test-reminder", post(reminders::send_test_reminder))
        .route("/digest/preview", get(reminders::preview_digest))
        .route("/digest/send", post(reminders::send_digest))
        .route("/export", get(transfer::export_zip))
        .route("/import", post(transfer::import_zip))
        .route("/export/csv", get(transfer::export_csv))
        .route("/export/ics", get(transfer::export_ics))
        .route("/import/csv/preview", post(transfer::preview_csv))
        .route("/import/csv", post(transfer::import_csv));

    let guarded = Router::new()
        .nest("/api", api)
        .route("/uploads/{file}", get(uploads::serve_photo))
        .route_layer(from_extractor_with_state::<RequireAccessKey, AppState>(
            state.clone(),
        ));

    Router::new()
        .route("/health", get(health))
        .merge(guarded)
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .with_state(state)
}
