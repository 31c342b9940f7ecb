//! Publishing to the external social platform.
//!
//! [`PublishGateway`] is the seam the scheduler depends on. [`Publisher`]
//! implements it over any [`PlatformApi`], and [`XApi`] is the real X client.

pub mod error;
pub mod gateway;
pub mod oauth;
pub mod x;

pub use error::{PublishError, Result};
pub use gateway::{PlatformApi, PublishGateway, Publisher};
pub use oauth::OAuthCredentials;
pub use x::XApi;
