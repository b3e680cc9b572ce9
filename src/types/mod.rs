pub mod birthday;
pub mod settings;

pub use birthday::{Birthday, BirthdayView, Gender, NewBirthday, PhotoChange, PhotoUpload};
pub use settings::{PublicSettings, SmtpSettings, SmtpSettingsInput};
