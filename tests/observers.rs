use chunk_ecs::prelude::*;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Health(u32);
#[derive(Debug, Clone, Copy, PartialEq)]
struct Armor(u32);

type Log = Arc<Mutex<Vec<EntityEvent>>>;

fn recording_world(config: WorldConfig) -> (World, Log) {
    let mut world = World::with_config(config).unwrap();
    let log: Log = Arc::default();
    let sink = Arc::clone(&log);
    world.add_observer(move |event: &EntityEvent| sink.lock().unwrap().push(*event));
    (world, log)
}

#[test]
fn test_lifecycle_events_in_order() {
    let (mut world, log) = recording_world(WorldConfig::default());
    let health = world.component_id::<Health>().unwrap();
    let armor = world.component_id::<Armor>().unwrap();

    let e = world.spawn((Health(10),)).unwrap();
    world.insert_one(e, Armor(5)).unwrap();
    world.remove_one::<Health>(e).unwrap();
    world.despawn(e).unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            EntityEvent::Spawned(e),
            EntityEvent::ComponentAdded(e, health),
            EntityEvent::ComponentAdded(e, armor),
            EntityEvent::ComponentRemoved(e, health),
            EntityEvent::ComponentRemoved(e, armor),
            EntityEvent::Despawned(e),
        ]
    );
}

#[test]
fn test_despawn_without_removed_events() {
    let config = WorldConfig {
        notify_removed_on_despawn: false,
        ..WorldConfig::default()
    };
    let (mut world, log) = recording_world(config);
    let e = world.spawn((Health(1), Armor(1))).unwrap();
    log.lock().unwrap().clear();

    world.despawn(e).unwrap();
    assert_eq!(*log.lock().unwrap(), vec![EntityEvent::Despawned(e)]);
}

#[test]
fn test_failed_changes_fire_nothing() {
    let (mut world, log) = recording_world(WorldConfig::default());
    let e = world.spawn((Health(1),)).unwrap();
    log.lock().unwrap().clear();

    assert!(world.insert_one(e, Health(2)).is_err());
    assert!(world.remove_one::<Armor>(e).is_err());
    assert!(log.lock().unwrap().is_empty());
}

struct Counter {
    added: usize,
    seen: Arc<Mutex<usize>>,
}

impl Observer for Counter {
    fn on_event(&mut self, event: &EntityEvent) {
        if let EntityEvent::ComponentAdded(..) = event {
            self.added += 1;
            *self.seen.lock().unwrap() = self.added;
        }
    }

    fn name(&self) -> &str {
        "counter"
    }
}

#[test]
fn test_removed_observer_stops_receiving() {
    let mut world = World::new();
    let seen = Arc::new(Mutex::new(0));
    let id = world.add_observer(Counter {
        added: 0,
        seen: Arc::clone(&seen),
    });

    world.spawn((Health(1), Armor(1))).unwrap();
    assert_eq!(*seen.lock().unwrap(), 2);

    assert!(world.remove_observer(id));
    world.spawn((Health(1),)).unwrap();
    assert_eq!(*seen.lock().unwrap(), 2);
    assert!(!world.remove_observer(id));
}
