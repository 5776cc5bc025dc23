use entitystore_core::{
    ChangeEvent, ChangeLogObserver, EntityManager, InventoryItem, LowStockAlert,
    LowStockAlertObserver, ManagerConfig, ManagerError, NotifyPolicy, Observer, ObserverError,
    QohChange, SchemaRegistry,
};
use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

#[derive(Default)]
struct Recorder {
    events: RefCell<Vec<ChangeEvent>>,
}

impl Recorder {
    fn count(&self) -> usize {
        self.events.borrow().len()
    }
}

impl Observer for Recorder {
    fn receive_update(
        &self,
        _subject: &EntityManager,
        event: &ChangeEvent,
    ) -> Result<(), ObserverError> {
        self.events.borrow_mut().push(event.clone());
        Ok(())
    }
}

struct Failing;

impl Observer for Failing {
    fn receive_update(
        &self,
        _subject: &EntityManager,
        _event: &ChangeEvent,
    ) -> Result<(), ObserverError> {
        Err(ObserverError::new("failing", "boom"))
    }
}

fn open_with(dir: &tempfile::TempDir, policy: NotifyPolicy) -> EntityManager {
    EntityManager::open(
        ManagerConfig::new(dir.path().join("store.data")).with_notify_policy(policy),
        SchemaRegistry::new().with::<InventoryItem>(),
    )
    .unwrap()
}

fn open(dir: &tempfile::TempDir) -> EntityManager {
    open_with(dir, NotifyPolicy::Propagate)
}

#[test]
fn update_publishes_type_defined_payload() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = open(&dir);
    let recorder = Rc::new(Recorder::default());
    manager.attach(recorder.clone());

    let item = manager
        .get_entity(&InventoryItem::new("abc-4589", 0, 5.67, 7.27))
        .unwrap();
    assert_eq!(recorder.count(), 0);

    item.set_qoh(&mut manager, 3).unwrap();

    let events = recorder.events.borrow();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].entity_id, item.id());
    assert!(events[0].is::<InventoryItem>());
    assert_eq!(events[0].primary.as_str(), "abc-4589");
    assert_eq!(
        events[0].decode::<QohChange>().unwrap(),
        QohChange {
            sku: "abc-4589".to_string(),
            new_qoh: 3,
            old_qoh: 0,
        }
    );
}

#[test]
fn equal_update_does_not_notify() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = open(&dir);
    let recorder = Rc::new(Recorder::default());
    manager.attach(recorder.clone());
    let item = manager
        .get_entity(&InventoryItem::new("abc-4589", 2, 5.67, 7.27))
        .unwrap();

    item.set_qoh(&mut manager, 2).unwrap();
    let same = item.read(&manager).unwrap();
    item.update(&mut manager, &same).unwrap();

    assert_eq!(recorder.count(), 0);
}

#[test]
fn observers_run_in_subscription_order_and_see_the_new_record() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = open(&dir);
    let seen = Rc::new(RefCell::new(Vec::new()));

    let first = {
        let seen = Rc::clone(&seen);
        move |subject: &EntityManager, event: &ChangeEvent| -> Result<(), ObserverError> {
            let qoh = subject.record(event.entity_id).unwrap()["qoh"].clone();
            seen.borrow_mut().push(format!("first:{qoh}"));
            Ok(())
        }
    };
    let second = {
        let seen = Rc::clone(&seen);
        move |_subject: &EntityManager, _event: &ChangeEvent| -> Result<(), ObserverError> {
            seen.borrow_mut().push("second".to_string());
            Ok(())
        }
    };
    manager.attach(Rc::new(first));
    manager.attach(Rc::new(second));

    let item = manager
        .get_entity(&InventoryItem::new("abc-4589", 0, 5.67, 7.27))
        .unwrap();
    item.set_qoh(&mut manager, 8).unwrap();

    assert_eq!(*seen.borrow(), vec!["first:8".to_string(), "second".to_string()]);
}

#[test]
fn duplicate_attach_delivers_twice_and_detach_removes_one() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = open(&dir);
    let recorder = Rc::new(Recorder::default());
    manager.attach(recorder.clone());
    manager.attach(recorder.clone());
    assert_eq!(manager.observer_count(), 2);

    let item = manager
        .get_entity(&InventoryItem::new("abc-4589", 0, 5.67, 7.27))
        .unwrap();
    item.set_qoh(&mut manager, 1).unwrap();
    assert_eq!(recorder.count(), 2);

    assert!(manager.detach(&recorder));
    item.set_qoh(&mut manager, 2).unwrap();
    assert_eq!(recorder.count(), 3);

    assert!(manager.detach(&recorder));
    assert!(!manager.detach(&recorder));
    assert_eq!(manager.observer_count(), 0);
}

#[test]
fn detach_of_unknown_observer_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = open(&dir);
    let attached = Rc::new(Recorder::default());
    let stranger = Rc::new(Recorder::default());
    manager.attach(attached.clone());

    assert!(!manager.detach(&stranger));
    assert_eq!(manager.observer_count(), 1);
}

#[test]
fn propagate_policy_stops_at_first_failure_after_applying_change() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = open(&dir);
    let recorder = Rc::new(Recorder::default());
    manager.attach(Rc::new(Failing));
    manager.attach(recorder.clone());
    let item = manager
        .get_entity(&InventoryItem::new("abc-4589", 0, 5.67, 7.27))
        .unwrap();

    let err = item.set_qoh(&mut manager, 6).unwrap_err();

    assert!(matches!(err, ManagerError::Observer(ref failure) if failure.observer == "failing"));
    assert_eq!(recorder.count(), 0);
    assert_eq!(item.qoh(&manager).unwrap(), 6);
    assert_eq!(manager.dirty_ids().len(), 2);
}

#[test]
fn continue_policy_runs_everyone_and_collects_failures() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = open_with(&dir, NotifyPolicy::Continue);
    let recorder = Rc::new(Recorder::default());
    manager.attach(Rc::new(Failing));
    manager.attach(recorder.clone());
    manager.attach(Rc::new(Failing));
    let item = manager
        .get_entity(&InventoryItem::new("abc-4589", 0, 5.67, 7.27))
        .unwrap();

    let err = item.set_qoh(&mut manager, 6).unwrap_err();

    assert!(matches!(err, ManagerError::Observers(ref failures) if failures.len() == 2));
    assert_eq!(recorder.count(), 1);
}

#[test]
fn change_log_appends_one_json_line_per_update() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("changes.log");
    let mut manager = open(&dir);
    manager.attach(Rc::new(ChangeLogObserver::new(&log_path)));

    let item = manager
        .get_entity(&InventoryItem::new("hjg-3821", 0, 7.89, 12.0))
        .unwrap();
    item.items_received(&mut manager, 2).unwrap();

    let raw = fs::read_to_string(&log_path).unwrap();
    let lines: Vec<QohChange> = raw
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].old_qoh, 0);
    assert_eq!(lines[1].new_qoh, 2);
    assert!(lines.iter().all(|change| change.sku == "hjg-3821"));
}

#[test]
fn change_log_failure_propagates_to_mutating_caller() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = open(&dir);
    manager.attach(Rc::new(ChangeLogObserver::new(dir.path())));

    let item = manager
        .get_entity(&InventoryItem::new("hjg-3821", 0, 7.89, 12.0))
        .unwrap();
    let err = item.set_qoh(&mut manager, 1).unwrap_err();
    assert!(matches!(err, ManagerError::Observer(ref failure) if failure.observer == "change_log"));
}

#[test]
fn low_stock_alert_fires_once_for_one_qualifying_update() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = open(&dir);
    let alerts = Rc::new(LowStockAlertObserver::default());
    manager.attach(alerts.clone());
    let item = manager
        .get_entity(&InventoryItem::new("eer-4521", 10, 8.45, 1.03))
        .unwrap();

    item.set_qoh(&mut manager, 4).unwrap();
    assert_eq!(
        alerts.alerts(),
        vec![LowStockAlert {
            sku: "eer-4521".to_string(),
            qoh: 4,
        }]
    );

    item.set_qoh(&mut manager, 4).unwrap();
    item.change_sale_price(&mut manager, 0.87).unwrap();
    assert_eq!(alerts.alert_count(), 1);

    item.set_qoh(&mut manager, 7).unwrap();
    assert_eq!(alerts.alert_count(), 1);
}

#[test]
fn low_stock_alert_counts_each_unit_shipped_below_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = open(&dir);
    let alerts = Rc::new(LowStockAlertObserver::new(5));
    manager.attach(alerts.clone());
    let item = manager
        .get_entity(&InventoryItem::new("xrf-3827", 6, 15.27, 19.99))
        .unwrap();

    item.items_have_shipped(&mut manager, 3).unwrap();

    let quantities: Vec<i64> = alerts.alerts().iter().map(|alert| alert.qoh).collect();
    assert_eq!(quantities, vec![4, 3]);
}
