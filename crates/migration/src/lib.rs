pub use sea_orm_migration::prelude::*;

mod m20260301_000001_users_and_sessions;
mod m20260301_000002_alumni;
mod m20260302_000003_profile_update_requests;
mod m20260305_000004_user_last_login;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_users_and_sessions::Migration),
            Box::new(m20260301_000002_alumni::Migration),
            Box::new(m20260302_000003_profile_update_requests::Migration),
            Box::new(m20260305_000004_user_last_login::Migration),
        ]
    }
}
