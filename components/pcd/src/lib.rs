//! Pseudo Character Devices - Memory-backed multi-instance driver
//!
//! # Purpose
//! Exposes N independent byte buffers as separate character devices, each
//! with its own size, permission mask and seekable cursor. Instances are
//! created when a platform device is probed and destroyed when it is
//! removed, or populated from a fixed table when the driver loads.
//!
//! # Integration Points
//! - Depends on: `pcd-chardev` (device numbers, cdev binding, device
//!   class, user copies), `pcd-platform` (probe/remove signals)
//! - Provides to: callers opening devices by number or node name
//! - Capabilities required: none (in-memory emulation)
//!
//! # Architecture
//! ```text
//!   PlatformBus ── probe/remove ──▶ PcdPlatformDriver ─┐
//!   PcdMultiDriver ── init/exit ───────────────────────┤
//!                                                      ▼
//!                                               DeviceManager
//!                                   (reserve, allocate, bind, expose)
//!                                                      │
//!   File ──▶ CdevTable ──▶ PcdFops ──▶ DeviceRegistry ─┴─▶ DeviceSlot
//! ```
//!
//! - [`slot`]: buffer plus immutable attributes
//! - [`registry`]: device number to live slot
//! - [`dispatch`]: open/read/write/llseek/release
//! - [`lifecycle`]: probe with ordered rollback, remove
//!
//! # Testing Strategy
//! - Unit tests: Per-module behavior (bounds, permissions, rollback)
//! - Integration tests: Bus-driven lifecycles, fault injection through
//!   failing collaborators, concurrent attach
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use pcd::{BoardConfig, CdevTable, File, PcdPlatformDriver, Whence};
//! use pcd_chardev::{ChrdevRegion, DeviceClass, UserBuffer};
//! use pcd_platform::PlatformBus;
//!
//! let board = BoardConfig::default();
//! let mut region = ChrdevRegion::new();
//! let cdevs = Arc::new(CdevTable::new());
//! let class = Arc::new(DeviceClass::create(&board.driver.class));
//!
//! let driver = Arc::new(
//!     PcdPlatformDriver::init(&board.driver, &mut region, cdevs.clone(), class.clone()).unwrap(),
//! );
//! let bus = PlatformBus::new();
//! bus.register_driver(driver.clone()).unwrap();
//! for pdev in board.platform_devices() {
//!     bus.register_device(pdev).unwrap();
//! }
//!
//! let mut file = File::open_by_name(&class, &cdevs, "pcdev-0").unwrap();
//! file.write(&b"hello".to_vec(), 5).unwrap();
//! file.llseek(0, Whence::FromStart).unwrap();
//! let mut out = UserBuffer::new(5);
//! file.read(&mut out, 5).unwrap();
//! assert_eq!(out.as_bytes(), b"hello");
//! ```

pub mod config;
pub mod dispatch;
pub mod lifecycle;
pub mod multi;
pub mod platform_driver;
pub mod registry;
pub mod slot;

mod error;
mod pdata;
mod perm;

pub use config::{BoardConfig, ConfigError, DeviceConfig, DriverConfig};
pub use dispatch::{CdevTable, File, FileOperations, PcdFops, Session, Whence};
pub use error::{PcdError, Result};
pub use lifecycle::{DeviceManager, LifecycleState};
pub use multi::PcdMultiDriver;
pub use pdata::PcdevPlatformData;
pub use perm::{Access, ParsePermissionError, Permission};
pub use platform_driver::{
    PcdPlatformDriver, CLASS_NAME, MAX_DEVICES, NODE_PREFIX, PCD_DRIVER_NAME, REGION_NAME,
};
pub use registry::{DeviceRegistry, Reservation};
pub use slot::{DeviceBuffer, DeviceSlot};
