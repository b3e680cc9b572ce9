use chrono::NaiveDate;
use tracing::{info, warn};

use crate::db::BirthdayStore;
use crate::error::AppError;
use crate::logging::redact;
use crate::service::calendar::{self, Upcoming, WeekdayGroups};
use crate::service::names::normalize_name;
use crate::storage::PhotoStore;
use crate::types::{Birthday, BirthdayView, NewBirthday, PhotoChange, PhotoUpload};

/// Birthday records plus the lifecycle of their photo files.
#[derive(Clone)]
pub struct BirthdayService {
    store: BirthdayStore,
    photos: PhotoStore,
}

impl BirthdayService {
    pub fn new(store: BirthdayStore, photos: PhotoStore) -> Self {
        Self { store, photos }
    }

    pub fn store(&self) -> &BirthdayStore {
        &self.store
    }

    pub fn photos(&self) -> &PhotoStore {
        &self.photos
    }

    /// All records, soonest birthday first.
    pub async fn list(&self, today: NaiveDate) -> Result<Vec<BirthdayView>, AppError> {
        let mut views: Vec<BirthdayView> = self
            .store
            .list_all()
            .await?
            .into_iter()
            .map(|b| BirthdayView::new(b, today))
            .collect();
        views.sort_by(|a, b| {
            a.days_until
                .cmp(&b.days_until)
                .then_with(|| a.birthday.name.cmp(&b.birthday.name))
        });
        Ok(views)
    }

    pub async fn get(&self, id: i64, today: NaiveDate) -> Result<BirthdayView, AppError> {
        let birthday = self.require(id).await?;
        Ok(BirthdayView::new(birthday, today))
    }

    /// Records observed on `today`, including Feb 29 births on Feb 28 of common years.
    pub async fn today(&self, today: NaiveDate) -> Result<Vec<BirthdayView>, AppError> {
        let keys = calendar::month_day_keys(today);
        let rows = self.store.list_by_month_day(&keys).await?;
        Ok(rows
            .into_iter()
            .filter(|b| calendar::is_birthday_on(b.birthdate, today))
            .map(|b| BirthdayView::new(b, today))
            .collect())
    }

    pub async fn upcoming(&self, today: NaiveDate, days: u32) -> Result<Vec<Upcoming>, AppError> {
        let records = self.store.list_all().await?;
        Ok(calendar::upcoming(&records, today, days))
    }

    pub async fn upcoming_by_weekday(
        &self,
        today: NaiveDate,
        days: u32,
    ) -> Result<WeekdayGroups, AppError> {
        Ok(calendar::group_by_weekday(self.upcoming(today, days).await?))
    }

    /// Existing records whose name matches ignoring case, spacing and accents.
    pub async fn find_duplicates(
        &self,
        name: &str,
        exclude_id: Option<i64>,
    ) -> Result<Vec<Birthday>, AppError> {
        let key = normalize_name(name);
        if key.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .store
            .list_all()
            .await?
            .into_iter()
            .filter(|b| Some(b.id) != exclude_id && normalize_name(&b.name) == key)
            .collect())
    }

    pub async fn create(
        &self,
        entry: NewBirthday,
        photo: Option<PhotoUpload>,
    ) -> Result<Birthday, AppError> {
        let photo_path = match photo {
            Some(upload) => Some(self.photos.save(&upload.filename, upload.bytes).await?),
            None => None,
        };
        match self.store.insert(&entry, photo_path.as_deref()).await {
            Ok(created) => {
                info!(id = created.id, "birthday created");
                Ok(created)
            }
            Err(e) => {
                if let Some(path) = photo_path.as_deref() {
                    self.discard_photo(path).await;
                }
                Err(e)
            }
        }
    }

    pub async fn update(
        &self,
        id: i64,
        entry: NewBirthday,
        change: PhotoChange,
    ) -> Result<Birthday, AppError> {
        let existing = self.require(id).await?;

        let (photo_path, uploaded) = match change {
            PhotoChange::Keep => (existing.photo.clone(), false),
            PhotoChange::Remove => (None, false),
            PhotoChange::Replace(upload) => (
                Some(self.photos.save(&upload.filename, upload.bytes).await?),
                true,
            ),
        };

        let updated = match self.store.update(id, &entry, photo_path.as_deref()).await {
            Ok(Some(updated)) => updated,
            outcome => {
                if let (true, Some(path)) = (uploaded, photo_path.as_deref()) {
                    self.discard_photo(path).await;
                }
                return match outcome {
                    Err(e) => Err(e),
                    _ => Err(AppError::BirthdayNotFound(id)),
                };
            }
        };

        if let Some(old) = existing.photo.as_deref()
            && updated.photo.as_deref() != Some(old)
        {
            self.release_photo(old).await;
        }
        info!(id, "birthday updated");
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<Birthday, AppError> {
        let removed = self
            .store
            .delete(id)
            .await?
            .ok_or(AppError::BirthdayNotFound(id))?;
        if let Some(photo) = removed.photo.as_deref() {
            self.release_photo(photo).await;
        }
        info!(id, "birthday deleted");
        Ok(removed)
    }

    /// Remove every record and the photos they owned.
    /// Write imported rows in one transaction. Photos already saved for the
    /// batch are discarded if the write fails; photos of replaced rows are
    /// released once it commits.
    pub async fn import_batch(
        &self,
        rows: Vec<(NewBirthday, Option<String>)>,
        replace: bool,
    ) -> Result<usize, AppError> {
        match self.store.insert_batch(&rows, replace).await {
            Ok(written) => {
                for photo in written.removed.iter().filter_map(|b| b.photo.as_deref()) {
                    self.release_photo(photo).await;
                }
                info!(
                    imported = written.ids.len(),
                    removed = written.removed.len(),
                    "birthday batch written"
                );
                Ok(written.ids.len())
            }
            Err(e) => {
                for path in rows.iter().filter_map(|(_, p)| p.as_deref()) {
                    self.discard_photo(path).await;
                }
                Err(e)
            }
        }
    }

    async fn require(&self, id: i64) -> Result<Birthday, AppError> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or(AppError::BirthdayNotFound(id))
    }

    /// Delete the file once no record points at it any more.
    async fn release_photo(&self, path: &str) {
        match self.store.count_photo_refs(path).await {
            Ok(0) => self.discard_photo(path).await,
            Ok(refs) => info!(path, refs, "photo still referenced, keeping file"),
            Err(e) => warn!(path, error = %redact(&e.to_string()), "could not count photo references"),
        }
    }

    async fn discard_photo(&self, path: &str) {
        if let Err(e) = self.photos.remove(path).await {
            warn!(path, error = %e, "failed to remove photo file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use crate::types::Gender;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use sqlx::sqlite::SqlitePoolOptions;
    use std::io::Cursor;
    use tempfile::TempDir;

    async fn service() -> (BirthdayService, TempDir) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let photos = PhotoStore::new(dir.path().join("uploads"));
        photos.initialize().await.unwrap();
        (BirthdayService::new(BirthdayStore::new(pool), photos), dir)
    }

    fn png() -> PhotoUpload {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        PhotoUpload {
            filename: "face.png".into(),
            bytes,
        }
    }

    fn entry(name: &str, date: &str) -> NewBirthday {
        NewBirthday::parse(name, date, None).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn list_is_sorted_by_countdown() {
        let (svc, _dir) = service().await;
        svc.create(entry("Later", "1990-12-01"), None).await.unwrap();
        svc.create(entry("Soon", "1990-03-02"), None).await.unwrap();
        svc.create(entry("Today", "2000-03-01"), None).await.unwrap();

        let list = svc.list(d(2024, 3, 1)).await.unwrap();
        let names: Vec<_> = list.iter().map(|v| v.birthday.name.as_str()).collect();
        assert_eq!(names, vec!["Today", "Soon", "Later"]);
        assert_eq!(list[0].days_until, 0);
        assert_eq!(list[0].age, 24);
    }

    #[tokio::test]
    async fn today_honours_leap_day_fallback() {
        let (svc, _dir) = service().await;
        svc.create(entry("Leap", "2000-02-29"), None).await.unwrap();
        svc.create(entry("Plain", "1999-02-28"), None).await.unwrap();

        assert_eq!(svc.today(d(2023, 2, 28)).await.unwrap().len(), 2);
        let leap_year = svc.today(d(2024, 2, 28)).await.unwrap();
        assert_eq!(leap_year.len(), 1);
        assert_eq!(leap_year[0].birthday.name, "Plain");
    }

    #[tokio::test]
    async fn duplicates_ignore_case_and_accents() {
        let (svc, _dir) = service().await;
        let jose = svc.create(entry("José  Núñez", "1990-01-01"), None).await.unwrap();
        svc.create(entry("Someone Else", "1990-01-01"), None).await.unwrap();

        let dups = svc.find_duplicates("jose nunez", None).await.unwrap();
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].id, jose.id);
        assert!(svc.find_duplicates("JOSE NUNEZ", Some(jose.id)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replacing_photo_removes_old_file() {
        let (svc, _dir) = service().await;
        let created = svc.create(entry("A", "1990-01-01"), Some(png())).await.unwrap();
        let old = created.photo.clone().unwrap();
        let old_file = svc.photos().resolve(&old).unwrap();
        assert!(old_file.exists());

        let updated = svc
            .update(created.id, entry("A", "1990-01-01"), PhotoChange::Replace(png()))
            .await
            .unwrap();
        let new = updated.photo.unwrap();
        assert_ne!(new, old);
        assert!(!old_file.exists());
        assert!(svc.photos().resolve(&new).unwrap().exists());
    }

    #[tokio::test]
    async fn shared_photo_survives_until_last_reference() {
        let (svc, _dir) = service().await;
        let a = svc.create(entry("A", "1990-01-01"), Some(png())).await.unwrap();
        let shared = a.photo.clone().unwrap();
        let b = svc
            .store()
            .insert(&entry("B", "1991-01-01"), Some(&shared))
            .await
            .unwrap();
        let file = svc.photos().resolve(&shared).unwrap();

        svc.delete(a.id).await.unwrap();
        assert!(file.exists());
        svc.delete(b.id).await.unwrap();
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn keep_and_remove_photo() {
        let (svc, _dir) = service().await;
        let created = svc.create(entry("A", "1990-01-01"), Some(png())).await.unwrap();
        let photo = created.photo.clone().unwrap();

        let kept = svc
            .update(
                created.id,
                NewBirthday::parse("A B", "1990-01-02", Some("female")).unwrap(),
                PhotoChange::Keep,
            )
            .await
            .unwrap();
        assert_eq!(kept.photo.as_deref(), Some(photo.as_str()));
        assert_eq!(kept.gender, Some(Gender::Female));

        let removed = svc
            .update(created.id, entry("A B", "1990-01-02"), PhotoChange::Remove)
            .await
            .unwrap();
        assert!(removed.photo.is_none());
        assert!(!svc.photos().resolve(&photo).unwrap().exists());
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let (svc, dir) = service().await;
        let err = svc
            .update(99, entry("A", "1990-01-01"), PhotoChange::Replace(png()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BirthdayNotFound(99)));
        assert!(matches!(svc.delete(99).await, Err(AppError::BirthdayNotFound(99))));
        assert!(matches!(svc.get(99, d(2024, 1, 1)).await, Err(AppError::BirthdayNotFound(99))));
        // nothing was written for the rejected upload
        let leftovers = std::fs::read_dir(dir.path().join("uploads")).unwrap().count();
        assert_eq!(leftovers, 0);
    }
}
