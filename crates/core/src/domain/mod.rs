pub mod approval;
pub mod order;
pub mod role;
pub mod user;
