pub mod birthdays;
pub mod calendar;
pub mod names;
pub mod reminders;
pub mod scheduler;
pub mod transfer;

pub use birthdays::BirthdayService;
pub use reminders::ReminderService;
pub use scheduler::ReminderScheduler;
pub use transfer::TransferService;
