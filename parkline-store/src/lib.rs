pub mod app_config;
pub mod database;
pub mod pg_store;
pub mod redis_repo;
pub mod checkout;
pub mod sensor_feed;
pub mod notifier;

pub use app_config::Config;
pub use database::DbClient;
pub use pg_store::PgParkingStore;
pub use redis_repo::RedisClient;
pub use checkout::HttpPaymentGateway;
pub use sensor_feed::HttpOccupancyFeed;
pub use notifier::StoreNotifier;
