pub mod attempt;
pub mod question;
pub mod timing;
