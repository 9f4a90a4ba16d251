pub mod account;
pub mod alumni;
pub mod profile_update_request;
pub mod session;
pub mod user;

pub use account::Entity as Account;
pub use alumni::Entity as Alumni;
pub use profile_update_request::Entity as ProfileUpdateRequest;
pub use session::Entity as Session;
pub use user::Entity as User;
