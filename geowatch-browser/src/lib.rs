//! Browser automation layer for GeoWatch engine adapters.
//!
//! Protocol code talks to a [`Page`]; in production that is a
//! [`WebDriverPage`] wrapping a WebDriver session launched with the stealth
//! fingerprint from [`stealth`], in tests a scripted fake from [`testing`].

pub mod human;
pub mod page;
pub mod stealth;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod webdriver;

pub use page::{LinkInfo, Page};
pub use stealth::{LAUNCH_ARGS, STEALTH_SCRIPT, StealthProfile, USER_AGENTS, VIEWPORTS};
pub use webdriver::{BrowserConfig, WebDriverPage};
