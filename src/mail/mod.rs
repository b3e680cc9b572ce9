//! Outbound email: message composition, SMTP delivery and failure mapping.

pub mod compose;
pub mod error;
pub mod transport;

pub use compose::{Body, InlineImage, Letter, PhotoAttachment};
pub use error::{MailError, SmtpFailure};
pub use transport::{Mailer, SmtpMailer, build_message};
