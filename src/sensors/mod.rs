pub mod models;
pub mod normalize;
pub mod presenter;

pub use models::Reading;
pub use normalize::normalize;
