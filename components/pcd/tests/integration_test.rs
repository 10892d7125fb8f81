//! Integration tests for pseudo character devices
//!
//! These tests drive the driver the way an outside caller does: devices
//! arrive through the platform bus or the static table, and I/O goes
//! through `File` handles resolved via the cdev table and device class.

use std::sync::Arc;

use pcd::*;
use pcd_chardev::{ChrdevRegion, DevNum, DeviceClass, UserBuffer};
use pcd_platform::{PlatformBus, PlatformDevice, PlatformDriver};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Board {
    region: ChrdevRegion,
    cdevs: Arc<CdevTable>,
    class: Arc<DeviceClass>,
    bus: PlatformBus,
    driver: Arc<PcdPlatformDriver>,
}

/// Load the platform driver and register every device of `config`
fn boot(config: &BoardConfig) -> Board {
    let mut region = ChrdevRegion::new();
    let cdevs = Arc::new(CdevTable::new());
    let class = Arc::new(DeviceClass::create(&config.driver.class));
    let driver = Arc::new(
        PcdPlatformDriver::init(&config.driver, &mut region, cdevs.clone(), class.clone())
            .expect("Failed to load platform driver"),
    );

    let bus = PlatformBus::new();
    bus.register_driver(driver.clone()).expect("Failed to register driver");
    for pdev in config.platform_devices() {
        bus.register_device(pdev).expect("Failed to register device");
    }

    Board {
        region,
        cdevs,
        class,
        bus,
        driver,
    }
}

fn rdwr_board(size: usize) -> BoardConfig {
    BoardConfig {
        driver: DriverConfig::default(),
        devices: vec![DeviceConfig {
            id: 0,
            size,
            perm: Permission::RDWR,
            serial: "PCDEV1".to_string(),
        }],
    }
}

/// Test the write/read/seek walk on a 512 byte read/write device
#[test]
fn test_scenario_write_read_seek_end() {
    init_logging();
    let board = boot(&rdwr_board(512));
    let mut file = File::open_by_name(&board.class, &board.cdevs, "pcdev-0")
        .expect("Failed to open pcdev-0");

    // 1. Write 100 bytes at cursor 0
    let payload: Vec<u8> = (0..100u8).collect();
    assert_eq!(file.write(&payload, 100).unwrap(), 100);
    assert_eq!(file.position(), 100);

    // 2. Read 1000 bytes from cursor 0: clamped to the device size
    file.llseek(0, Whence::FromStart).unwrap();
    let mut out = UserBuffer::new(1000);
    assert_eq!(file.read(&mut out, 1000).unwrap(), 512);
    assert_eq!(&out.as_bytes()[..100], payload.as_slice());
    assert!(out.as_bytes()[100..512].iter().all(|&b| b == 0));

    // 3. Seek to the end; further reads report end of device
    assert_eq!(file.llseek(0, Whence::FromEnd).unwrap(), 512);
    assert_eq!(file.read(&mut out, 10).unwrap(), 0);
    assert!(matches!(
        file.write(&payload, 1),
        Err(PcdError::OutOfSpace { .. })
    ));
}

/// Test permissions on a read-only and a write-only device
#[test]
fn test_scenario_read_only_and_write_only() {
    init_logging();
    let config = BoardConfig {
        driver: DriverConfig::default(),
        devices: vec![
            DeviceConfig {
                id: 0,
                size: 1024,
                perm: Permission::RDONLY,
                serial: "RO".to_string(),
            },
            DeviceConfig {
                id: 1,
                size: 512,
                perm: Permission::WRONLY,
                serial: "WO".to_string(),
            },
        ],
    };
    let board = boot(&config);

    let mut read_only = File::open_by_name(&board.class, &board.cdevs, "pcdev-0").unwrap();
    let mut write_only = File::open_by_name(&board.class, &board.cdevs, "pcdev-1").unwrap();

    let err = write_only.read(&mut UserBuffer::new(4), 4).unwrap_err();
    assert!(matches!(
        err,
        PcdError::PermissionDenied {
            access: Access::Read,
            ..
        }
    ));

    let err = read_only.write(&b"data".to_vec(), 4).unwrap_err();
    assert!(matches!(
        err,
        PcdError::PermissionDenied {
            access: Access::Write,
            ..
        }
    ));
    assert_eq!(err.errno().to_kernel(), -1);

    // The rejected write left the buffer untouched
    let slot = board
        .driver
        .manager()
        .registry()
        .lookup(read_only.devnum())
        .unwrap();
    assert_eq!(slot.snapshot(), vec![0u8; 1024]);
    assert_eq!(read_only.position(), 0);

    // Write-only devices still accept writes
    assert_eq!(write_only.write(&b"data".to_vec(), 4).unwrap(), 4);
}

/// Test that a detached device's former handle is gone for open files and new opens
#[test]
fn test_scenario_detach_then_read() {
    init_logging();
    let board = boot(&rdwr_board(64));
    let mut file = File::open_by_name(&board.class, &board.cdevs, "pcdev-0").unwrap();
    let devnum = file.devnum();

    board
        .bus
        .unregister_device(PCD_DRIVER_NAME, 0)
        .expect("Failed to remove device");

    let err = file.read(&mut UserBuffer::new(8), 8).unwrap_err();
    assert!(matches!(err, PcdError::NotFound { .. }));
    assert!(matches!(
        File::open(&board.cdevs, devnum),
        Err(PcdError::NotFound { .. })
    ));
    assert!(matches!(
        File::open_by_name(&board.class, &board.cdevs, "pcdev-0"),
        Err(PcdError::UnknownNode { .. })
    ));
    file.close();
}

/// Test that the default board brings up both devices with their sizes
#[test]
fn test_default_board_bring_up() {
    init_logging();
    let mut board = boot(&BoardConfig::default());
    let manager = board.driver.manager();

    assert_eq!(manager.total_devices(), 2);
    assert_eq!(board.class.names(), vec!["pcdev-0", "pcdev-1"]);
    let sizes: Vec<usize> = manager
        .registry()
        .handles()
        .into_iter()
        .map(|d| manager.registry().lookup(d).unwrap().capacity())
        .collect();
    assert_eq!(sizes, vec![512, 1024]);

    // Driver unload removes everything, then exit frees the region
    board.bus.unregister_driver(PCD_DRIVER_NAME).unwrap();
    assert_eq!(board.driver.manager().total_devices(), 0);
    assert!(board.cdevs.is_empty());
    board.driver.exit(&mut board.region);
    assert!(board.region.is_empty());
}

/// Test name lookup and number lookup reach the same device
#[test]
fn test_open_by_name_matches_open_by_number() {
    init_logging();
    let board = boot(&BoardConfig::default());

    let mut by_name = File::open_by_name(&board.class, &board.cdevs, "pcdev-1").unwrap();
    let devnum = board.driver.base() + 1;
    let mut by_number = File::open(&board.cdevs, devnum).unwrap();
    assert_eq!(by_name.devnum(), devnum);

    by_name.write(&b"shared".to_vec(), 6).unwrap();
    let mut out = UserBuffer::new(6);
    by_number.read(&mut out, 6).unwrap();
    assert_eq!(out.as_bytes(), b"shared");

    // Sessions keep private cursors
    assert_eq!(by_name.position(), 6);
    assert_eq!(by_number.position(), 6);
    by_number.llseek(0, Whence::FromStart).unwrap();
    assert_eq!(by_name.position(), 6);
}

/// Test that a device with zero size fails probe and is left unbound
#[test]
fn test_zero_size_device_rejected_at_probe() {
    init_logging();
    let config = BoardConfig::from_toml_str(
        r#"
        [[device]]
        id = 0
        size = 0
        perm = "rdwr"
        serial = "EMPTY"
        "#,
    )
    .unwrap();

    let mut region = ChrdevRegion::new();
    let cdevs = Arc::new(CdevTable::new());
    let class = Arc::new(DeviceClass::create(CLASS_NAME));
    let driver = Arc::new(
        PcdPlatformDriver::init(&config.driver, &mut region, cdevs.clone(), class.clone()).unwrap(),
    );
    let bus = PlatformBus::new();
    bus.register_driver(driver.clone()).unwrap();

    let pdev = config.platform_devices().remove(0);
    assert!(matches!(
        driver.probe_device(&pdev),
        Err(PcdError::InvalidConfig { id: 0, .. })
    ));
    assert!(bus.register_device(pdev).is_err());
    assert!(!bus.is_bound(PCD_DRIVER_NAME, 0));
    assert!(cdevs.is_empty());
    assert!(class.is_empty());
}

/// Test that a device id outside the region is refused with ENOSPC
#[test]
fn test_device_id_outside_region() {
    init_logging();
    let board = boot(&BoardConfig {
        driver: DriverConfig::default(),
        devices: Vec::new(),
    });
    let pdev = PlatformDevice::new(PCD_DRIVER_NAME, MAX_DEVICES)
        .with_platform_data(PcdevPlatformData::new(8, Permission::RDWR, "LATE"));

    assert_eq!(
        board.driver.probe(&pdev),
        Err(pcd_chardev::Errno::ENOSPC)
    );
}

/// Test the static four-device driver end to end
#[test]
fn test_static_driver_devices() {
    init_logging();
    let mut region = ChrdevRegion::new();
    let cdevs = Arc::new(CdevTable::new());
    let class = Arc::new(DeviceClass::create(CLASS_NAME));

    let driver = PcdMultiDriver::init(
        &multi::default_devices(),
        &mut region,
        cdevs.clone(),
        class.clone(),
    )
    .expect("Failed to load static driver");

    let mut pcd0 = File::open_by_name(&class, &cdevs, "pcd0").unwrap();
    let mut pcd1 = File::open_by_name(&class, &cdevs, "pcd1").unwrap();
    let mut pcd3 = File::open_by_name(&class, &cdevs, "pcd3").unwrap();

    assert!(pcd0.write(&b"x".to_vec(), 1).is_err());
    assert!(pcd1.read(&mut UserBuffer::new(1), 1).is_err());
    assert_eq!(pcd3.llseek(-12, Whence::FromEnd).unwrap(), 500);
    assert_eq!(pcd3.write(&vec![7u8; 64], 64).unwrap(), 12);

    drop((pcd0, pcd1, pcd3));
    driver.exit(&mut region);
    assert!(cdevs.is_empty());
    assert!(class.is_empty());
    assert!(region.is_empty());
}

/// Test that seeking to the capacity from start or via current agree
#[test]
fn test_seek_paths_agree() {
    init_logging();
    let board = boot(&BoardConfig::default());
    let devnum: DevNum = board.driver.base() + 1;
    let mut file = File::open(&board.cdevs, devnum).unwrap();

    file.llseek(0, Whence::FromStart).unwrap();
    let via_current = file.llseek(1024, Whence::FromCurrent).unwrap();
    let via_start = file.llseek(1024, Whence::FromStart).unwrap();
    assert_eq!(via_current, via_start);
    assert!(matches!(
        file.llseek(1, Whence::FromCurrent),
        Err(PcdError::InvalidOffset { target: 1025 })
    ));
    assert_eq!(file.position(), 1024);
}
