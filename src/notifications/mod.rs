mod email;

pub use email::{OtpMailer, OtpPurpose};
