pub mod register;
pub mod validate;
