//! Radio driver abstraction layer

pub mod mock_driver;
pub mod radio_driver;
pub mod wifi_ctrl_driver;

pub use radio_driver::{RadioDriver, RadioEvent, RadioEventReceiver, RadioEventSender};
pub use wifi_ctrl_driver::WifiCtrlDriver;

#[cfg(test)]
pub use mock_driver::{MockCommand, MockRadioDriver};
