pub mod email;
pub mod fcm;
pub mod health;
pub mod notification;
pub mod preferences;
pub mod response;
pub mod retry;
pub mod sms;
pub mod validation;
