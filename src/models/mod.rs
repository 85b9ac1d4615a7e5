pub mod user;

pub use user::{CreateUserDto, UpdateUserDto, User};
