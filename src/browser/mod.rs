//! Browser automation module
//!
//! This module provides browser control through ChromiumOxide, including
//! lifecycle management, navigation, capture primitives, and the trait
//! seams the capture pipeline is written against.

pub mod capture;
pub mod controller;
pub mod navigation;
pub mod page;

pub use capture::PageCapture;
pub use controller::{
    BrowserConfig, BrowserController, ChromeSession, ChromeSessionFactory, PageHandle,
};
pub use navigation::{PageNavigator, UrlValidator, WaitUntil};
pub use page::{
    BrowserPage, BrowserSession, NavigationOutcome, PrintLayout, SessionCookie, SessionFactory,
};
