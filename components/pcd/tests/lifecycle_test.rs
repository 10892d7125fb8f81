//! Lifecycle tests: probe rollback under injected failures, concurrent
//! attach, and teardown while I/O holds a device

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pcd::*;
use pcd_chardev::{
    CdevToken, ChardevError, ChrdevRegion, DevNum, DeviceClass, DeviceToken, Exposure, IoBinding,
    UserBuffer,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Device class that refuses to publish one node name
struct RefusingClass {
    inner: DeviceClass,
    refuse: String,
    attempts: AtomicUsize,
}

impl RefusingClass {
    fn new(refuse: &str) -> Self {
        Self {
            inner: DeviceClass::create(CLASS_NAME),
            refuse: refuse.to_string(),
            attempts: AtomicUsize::new(0),
        }
    }
}

impl Exposure for RefusingClass {
    fn expose(&self, devnum: DevNum, name: &str) -> core::result::Result<DeviceToken, ChardevError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if name == self.refuse {
            return Err(ChardevError::NameTaken {
                name: name.to_string(),
            });
        }
        self.inner.expose(devnum, name)
    }

    fn withdraw(&self, token: DeviceToken) {
        self.inner.withdraw(token)
    }
}

/// Binding table that counts live bindings and can refuse every bind
struct CountingCdevs {
    inner: CdevTable,
    live: AtomicUsize,
    refuse_all: bool,
}

impl CountingCdevs {
    fn new(refuse_all: bool) -> Self {
        Self {
            inner: CdevTable::new(),
            live: AtomicUsize::new(0),
            refuse_all,
        }
    }

    fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl IoBinding<dyn FileOperations> for CountingCdevs {
    fn bind(
        &self,
        devnum: DevNum,
        ops: Arc<dyn FileOperations>,
    ) -> core::result::Result<CdevToken, ChardevError> {
        if self.refuse_all {
            return Err(ChardevError::AlreadyBound { devnum });
        }
        let token = self.inner.bind(devnum, ops)?;
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(token)
    }

    fn unbind(&self, token: CdevToken) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.inner.unbind(token)
    }
}

fn pdata(size: usize) -> PcdevPlatformData {
    PcdevPlatformData::new(size, Permission::RDWR, "LIFECYCLE")
}

/// Test that a failing exposure step rolls back binding and buffer
#[test]
fn test_exposure_failure_full_rollback() {
    init_logging();
    let cdevs = Arc::new(CountingCdevs::new(false));
    let class = Arc::new(RefusingClass::new("pcdev-1"));
    let manager = DeviceManager::new(
        DevNum::new(254, 0),
        4,
        NODE_PREFIX,
        cdevs.clone(),
        class.clone(),
    );

    manager.attach(0, Some(&pdata(32))).unwrap();
    let err = manager.attach(1, Some(&pdata(32))).unwrap_err();

    assert!(matches!(err, PcdError::ExposureFailed(ChardevError::NameTaken { .. })));
    assert_eq!(err.errno(), pcd_chardev::Errno::EBUSY);
    assert_eq!(class.attempts.load(Ordering::SeqCst), 2);

    // Only the first device's resources remain
    assert_eq!(cdevs.live(), 1);
    assert_eq!(manager.total_devices(), 1);
    assert_eq!(manager.registry().handles(), vec![DevNum::new(254, 0)]);
    assert_eq!(manager.state(1), Some(LifecycleState::Unattached));
    assert_eq!(class.inner.names(), vec!["pcdev-0"]);
}

/// Test that a failing binding step never reaches exposure
#[test]
fn test_binding_failure_rollback() {
    init_logging();
    let cdevs = Arc::new(CountingCdevs::new(true));
    let class = Arc::new(RefusingClass::new(""));
    let manager =
        DeviceManager::new(DevNum::new(254, 0), 2, NODE_PREFIX, cdevs.clone(), class.clone());

    let err = manager.attach(0, Some(&pdata(16))).unwrap_err();
    assert!(matches!(err, PcdError::BindingFailed(_)));
    assert_eq!(class.attempts.load(Ordering::SeqCst), 0);
    assert_eq!(cdevs.live(), 0);
    assert!(manager.registry().is_empty());
    assert_eq!(manager.total_devices(), 0);
}

/// Test that the static driver unwinds every device and the region on failure
#[test]
fn test_static_init_failure_unwinds() {
    init_logging();
    let mut region = ChrdevRegion::new();
    let cdevs = Arc::new(CountingCdevs::new(false));
    let class = Arc::new(RefusingClass::new("pcd2"));

    let result = PcdMultiDriver::init(
        &multi::default_devices(),
        &mut region,
        cdevs.clone(),
        class.clone(),
    );

    assert!(matches!(result, Err(PcdError::ExposureFailed(_))));
    assert_eq!(cdevs.live(), 0);
    assert!(class.inner.is_empty());
    assert!(region.is_empty());
}

/// Test concurrent attaches on distinct ordinals
#[test]
fn test_concurrent_attach_distinct_ordinals() {
    init_logging();
    let cdevs = Arc::new(CdevTable::new());
    let class = Arc::new(DeviceClass::create(CLASS_NAME));
    let manager = DeviceManager::new(
        DevNum::new(254, 0),
        MAX_DEVICES,
        NODE_PREFIX,
        cdevs.clone(),
        class.clone(),
    );

    let handles = crossbeam::scope(|s| {
        let workers: Vec<_> = (0..MAX_DEVICES)
            .map(|ordinal| {
                let manager = &manager;
                s.spawn(move |_| manager.attach(ordinal, Some(&pdata(128))))
            })
            .collect();
        workers
            .into_iter()
            .map(|w| w.join().unwrap().unwrap())
            .collect::<Vec<_>>()
    })
    .unwrap();

    let mut sorted = handles.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), MAX_DEVICES as usize);
    assert_eq!(manager.total_devices(), MAX_DEVICES as usize);
    assert_eq!(cdevs.len(), MAX_DEVICES as usize);
    assert_eq!(class.len(), MAX_DEVICES as usize);
}

/// Test racing attaches on one ordinal: exactly one wins
#[test]
fn test_concurrent_attach_same_ordinal() {
    init_logging();
    let manager = DeviceManager::new(
        DevNum::new(254, 0),
        1,
        NODE_PREFIX,
        Arc::new(CdevTable::new()),
        Arc::new(DeviceClass::create(CLASS_NAME)),
    );

    let wins = AtomicUsize::new(0);
    crossbeam::scope(|s| {
        for _ in 0..8 {
            s.spawn(|_| {
                if manager.attach(0, Some(&pdata(8))).is_ok() {
                    wins.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    })
    .unwrap();

    assert_eq!(wins.load(Ordering::SeqCst), 1);
    assert_eq!(manager.total_devices(), 1);
}

/// Test that I/O and detach can interleave without invalid memory access
#[test]
fn test_detach_during_io() {
    init_logging();
    let cdevs = Arc::new(CdevTable::new());
    let class = Arc::new(DeviceClass::create(CLASS_NAME));
    let manager =
        DeviceManager::new(DevNum::new(254, 0), 1, NODE_PREFIX, cdevs.clone(), class.clone());
    let devnum = manager.attach(0, Some(&pdata(4096))).unwrap();

    // A call already holding the slot keeps resident memory
    let pinned = manager.registry().lookup(devnum).unwrap();

    crossbeam::scope(|s| {
        s.spawn(|_| {
            let Ok(mut file) = File::open(&cdevs, devnum) else {
                return;
            };
            let chunk = vec![0xA5u8; 64];
            loop {
                match file.write(&chunk, chunk.len()) {
                    Ok(_) => {}
                    Err(PcdError::OutOfSpace { .. }) => {
                        let _ = file.llseek(0, Whence::FromStart);
                    }
                    Err(PcdError::NotFound { .. }) => break,
                    Err(err) => panic!("unexpected error: {}", err),
                }
            }
        });
        s.spawn(|_| manager.detach(0));
    })
    .unwrap();

    assert!(!pinned.is_live());
    assert_eq!(pinned.capacity(), 4096);
    assert_eq!(pinned.snapshot().len(), 4096);
    assert!(matches!(
        manager.registry().lookup(devnum),
        Err(PcdError::NotFound { .. })
    ));

    // The ordinal can be probed again
    manager.attach(0, Some(&pdata(16))).unwrap();
    let mut file = File::open(&cdevs, devnum).unwrap();
    let mut out = UserBuffer::new(16);
    assert_eq!(file.read(&mut out, 16).unwrap(), 16);
    assert_eq!(out.as_bytes(), &[0u8; 16]);
}

/// Test write fault semantics: error reported, cursor unmoved
#[test]
fn test_write_fault_reports_failure() {
    init_logging();
    let cdevs = Arc::new(CdevTable::new());
    let class = Arc::new(DeviceClass::create(CLASS_NAME));
    let manager =
        DeviceManager::new(DevNum::new(254, 0), 1, NODE_PREFIX, cdevs.clone(), class.clone());
    manager.attach(0, Some(&pdata(32))).unwrap();

    let mut file = File::open_by_name(&class, &cdevs, "pcdev-0").unwrap();
    let src = UserBuffer::from_bytes(&[1u8; 16]).with_fault_at(10);
    assert!(matches!(
        file.write(&src, 16),
        Err(PcdError::FaultBoundary { copied: 10 })
    ));
    assert_eq!(file.position(), 0);
}
