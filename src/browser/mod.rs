pub mod chrome_session;
pub mod connection;
pub mod headless;

pub use chrome_session::{ChromeSession, ChromeSessionProvider, ChromeTab};
pub use connection::connect_to_browser;
pub use headless::{launch_browser, LaunchOptions};
