use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::path::Path;

use engine::{write_text_atomic, Camera2D, ObjectClass, Scheduler, SchedulerSnapshot, WorldId};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::components::{Collecting, Collector, CollectorState, Walker, Wildlife};
use super::defs::GameDefs;
use super::systems::Callback;
use super::types::Point;
use super::world::{ObjectKind, World, WorldObject};

pub const SAVE_VERSION: u32 = 1;

pub type SaveLoadResult<T> = Result<T, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveGame {
    pub save_version: u32,
    pub content_hash: String,
    pub tick: u64,
    pub next_worldid: u64,
    pub local_player: WorldId,
    pub main_island: WorldId,
    pub camera: Camera2D,
    pub objects: Vec<WorldObject>,
    pub scheduler: SchedulerSnapshot<Callback>,
}

/// A validated save turned back into live state, ready to be wrapped in a session.
#[derive(Debug)]
pub struct RestoredGame {
    pub world: World,
    pub scheduler: Scheduler<Callback>,
    pub camera: Camera2D,
    pub local_player: WorldId,
    pub main_island: WorldId,
}

pub fn build_save_game(
    world: &World,
    scheduler: &Scheduler<Callback>,
    camera: &Camera2D,
    local_player: WorldId,
    main_island: WorldId,
    content_hash: &str,
) -> SaveGame {
    SaveGame {
        save_version: SAVE_VERSION,
        content_hash: content_hash.to_string(),
        tick: scheduler.cur_tick(),
        next_worldid: world.next_worldid(),
        local_player,
        main_island,
        camera: *camera,
        objects: world.objects().cloned().collect(),
        scheduler: scheduler.snapshot(),
    }
}

pub fn write_save_game(path: &Path, save: &SaveGame) -> SaveLoadResult<()> {
    let json =
        serde_json::to_string_pretty(save).map_err(|error| format!("encode save json: {error}"))?;
    write_text_atomic(path, &json)
        .map_err(|error| format!("write save '{}': {error}", path.display()))
}

pub fn read_save_game(path: &Path) -> SaveLoadResult<SaveGame> {
    let raw = fs::read_to_string(path)
        .map_err(|error| format!("read save '{}': {error}", path.display()))?;
    parse_save_game_json(&raw)
}

pub fn parse_save_game_json(raw: &str) -> SaveLoadResult<SaveGame> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    match serde_path_to_error::deserialize::<_, SaveGame>(&mut deserializer) {
        Ok(save) => Ok(save),
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            if path.is_empty() || path == "." {
                Err(format!("parse save json: {source}"))
            } else {
                Err(format!("parse save json at {path}: {source}"))
            }
        }
    }
}

fn validation_err(path: &str, message: impl Into<String>) -> String {
    format!("validation failed at {path}: {}", message.into())
}

fn expected_actual(path: &str, expected: impl Display, actual: impl Display) -> String {
    validation_err(path, format!("expected {expected}, got {actual}"))
}

fn require_kind<'s>(
    kinds: &HashMap<WorldId, &'s ObjectKind>,
    path: &str,
    id: WorldId,
    expected: &str,
) -> SaveLoadResult<&'s ObjectKind> {
    match kinds.get(&id).copied() {
        Some(kind) if kind.type_name() == expected => Ok(kind),
        Some(kind) => Err(expected_actual(
            path,
            format!("{expected} {id}"),
            format!("{} {id}", kind.type_name()),
        )),
        None => Err(validation_err(path, format!("unknown worldid {id}"))),
    }
}

fn require_def(
    defs: &GameDefs,
    path: &str,
    def: &str,
    class: ObjectClass,
) -> SaveLoadResult<()> {
    match defs.template(def) {
        Some(template) if template.class() == class => Ok(()),
        Some(template) => Err(expected_actual(
            path,
            format!("{class:?} def"),
            format!("{:?} def '{def}'", template.class()),
        )),
        None => Err(validation_err(path, format!("unknown def '{def}'"))),
    }
}

fn require_on_island(
    kinds: &HashMap<WorldId, &ObjectKind>,
    path: &str,
    island: WorldId,
    position: Point,
) -> SaveLoadResult<()> {
    let island_path = format!("{path}.island");
    let ObjectKind::Island { width, height, .. } =
        require_kind(kinds, &island_path, island, "island")?
    else {
        return Err(validation_err(&island_path, "not an island"));
    };
    let inside =
        position.x >= 0 && position.y >= 0 && position.x < *width && position.y < *height;
    if !inside {
        return Err(expected_actual(
            &format!("{path}.position"),
            format!("tile inside {width}x{height} island {island}"),
            position,
        ));
    }
    Ok(())
}

/// Schema and hard-reference checks. Nothing is built until these pass.
pub fn validate_save_game(save: &SaveGame, defs: &GameDefs) -> SaveLoadResult<()> {
    if save.save_version != SAVE_VERSION {
        return Err(expected_actual(
            "save_version",
            SAVE_VERSION,
            save.save_version,
        ));
    }
    if save.content_hash != defs.content_hash() {
        return Err(expected_actual(
            "content_hash",
            defs.content_hash(),
            &save.content_hash,
        ));
    }
    for (path, value) in [
        ("camera.position.x", save.camera.position.x),
        ("camera.position.y", save.camera.position.y),
        ("camera.zoom", save.camera.zoom),
    ] {
        if !value.is_finite() {
            return Err(expected_actual(path, "finite number", value));
        }
    }
    if save.tick != save.scheduler.cur_tick {
        return Err(expected_actual(
            "scheduler.cur_tick",
            save.tick,
            save.scheduler.cur_tick,
        ));
    }

    let mut kinds = HashMap::with_capacity(save.objects.len());
    let mut first_index = HashMap::with_capacity(save.objects.len());
    for (index, object) in save.objects.iter().enumerate() {
        let id_path = format!("objects[{index}].id");
        if object.id.0 == 0 {
            return Err(validation_err(&id_path, "worldid 0 is never allocated"));
        }
        if let Some(first) = first_index.insert(object.id, index) {
            return Err(validation_err(
                &id_path,
                format!(
                    "duplicate worldid {} (first seen at objects[{first}].id)",
                    object.id
                ),
            ));
        }
        kinds.insert(object.id, &object.kind);
    }
    let max_id = save.objects.iter().map(|object| object.id.0).max().unwrap_or(0);
    if save.next_worldid <= max_id {
        return Err(expected_actual(
            "next_worldid",
            format!("value above highest worldid {max_id}"),
            save.next_worldid,
        ));
    }

    match require_kind(&kinds, "local_player", save.local_player, "player")? {
        ObjectKind::Player {
            is_local_player: true,
            ..
        } => {}
        _ => {
            return Err(validation_err(
                "local_player",
                format!("player {} is not flagged as local", save.local_player),
            ))
        }
    }
    require_kind(&kinds, "main_island", save.main_island, "island")?;

    let mut occupied = HashMap::new();
    for (index, object) in save.objects.iter().enumerate() {
        let base = format!("objects[{index}]");
        if let Some(owner) = object.owner {
            require_kind(&kinds, &format!("{base}.owner"), owner, "player")?;
        }
        match &object.kind {
            ObjectKind::Player { .. } => {}
            ObjectKind::Island { width, height, .. } => {
                if *width <= 0 || *height <= 0 {
                    return Err(expected_actual(
                        &format!("{base}.width"),
                        "positive island size",
                        format!("{width}x{height}"),
                    ));
                }
            }
            ObjectKind::Settlement { island, .. } => {
                require_kind(&kinds, &format!("{base}.island"), *island, "island")?;
            }
            ObjectKind::Building {
                def,
                position,
                island,
                settlement,
            } => {
                require_def(defs, &format!("{base}.def"), def, ObjectClass::Building)?;
                require_on_island(&kinds, &base, *island, *position)?;
                if let Some(settlement) = settlement {
                    let path = format!("{base}.settlement");
                    match require_kind(&kinds, &path, *settlement, "settlement")? {
                        ObjectKind::Settlement {
                            island: settlement_island,
                            ..
                        } if settlement_island == island => {}
                        _ => {
                            return Err(validation_err(
                                &path,
                                format!("settlement {settlement} is not on island {island}"),
                            ))
                        }
                    }
                }
                if let Some(first) = occupied.insert((*island, *position), index) {
                    return Err(validation_err(
                        &format!("{base}.position"),
                        format!("tile {position} already occupied by objects[{first}]"),
                    ));
                }
            }
            ObjectKind::Unit {
                def,
                position,
                island,
            } => {
                require_def(defs, &format!("{base}.def"), def, ObjectClass::Unit)?;
                require_on_island(&kinds, &base, *island, *position)?;
            }
        }

        if let Some(collector) = object.get::<Collector>() {
            require_kind(
                &kinds,
                &format!("{base}.components.collector.home"),
                collector.home,
                "building",
            )?;
            let needs_job = matches!(
                collector.state,
                CollectorState::WaitingForAnimalToStop
                    | CollectorState::MovingToTarget
                    | CollectorState::Working
            );
            if needs_job && collector.job.is_none() {
                return Err(validation_err(
                    &format!("{base}.components.collector.job"),
                    format!("collector in state {:?} has no job", collector.state),
                ));
            }
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Reconciled {
    released_animals: Vec<WorldId>,
    orphaned_waiters: Vec<(WorldId, WorldId)>,
}

/// Soft references may point at objects that no longer exist; they are dropped, not rejected.
fn reconcile_soft_references(world: &mut World) -> Reconciled {
    let mut reconciled = Reconciled::default();
    for id in world.ids() {
        let Ok(object) = world.get(id) else {
            continue;
        };

        if let Some(collecting) = object.get::<Collecting>() {
            let (kept, dropped): (Vec<_>, Vec<_>) =
                collecting.collectors.iter().copied().partition(|collector| {
                    world
                        .component::<Collector>(*collector)
                        .is_some_and(|component| component.home == id)
                });
            for collector in &dropped {
                warn!(
                    building = id.0,
                    collector = collector.0,
                    "save_collector_reference_dropped"
                );
            }
            if !dropped.is_empty() {
                if let Some(collecting) = world.component_mut::<Collecting>(id) {
                    collecting.collectors = kept;
                }
            }
        }

        let stale_listener = world
            .component::<Wildlife>(id)
            .and_then(|animal| animal.stop_listener)
            .filter(|listener| world.component::<Collector>(*listener).is_none());
        if let Some(listener) = stale_listener {
            warn!(
                animal = id.0,
                listener = listener.0,
                "save_stop_listener_dropped"
            );
            if let Some(animal) = world.component_mut::<Wildlife>(id) {
                animal.stop_listener = None;
                animal.halted = false;
            }
            reconciled.released_animals.push(id);
        }

        let orphaned_target = world
            .component::<Collector>(id)
            .filter(|collector| collector.state == CollectorState::WaitingForAnimalToStop)
            .and_then(|collector| collector.job)
            .map(|job| job.target)
            .filter(|target| !world.contains(*target));
        if let Some(target) = orphaned_target {
            warn!(collector = id.0, target = target.0, "save_job_target_missing");
            reconciled.orphaned_waiters.push((id, target));
        }
    }
    reconciled
}

/// Validates `save` and rebuilds the world and scheduler it describes.
pub fn restore_save_game(save: SaveGame, defs: &GameDefs) -> SaveLoadResult<RestoredGame> {
    validate_save_game(&save, defs)?;
    let SaveGame {
        next_worldid,
        local_player,
        main_island,
        camera,
        objects,
        scheduler: mut snapshot,
        ..
    } = save;

    let mut world = World::new();
    for object in objects {
        world
            .register(object)
            .map_err(|error| validation_err("objects", error.to_string()))?;
    }
    world.restore_next_worldid(next_worldid);
    world.rebuild_derived_state();
    let reconciled = reconcile_soft_references(&mut world);

    let before = snapshot.entries.len();
    snapshot
        .entries
        .retain(|entry| world.contains(entry.callback.subject()));
    let dropped = before - snapshot.entries.len();
    if dropped > 0 {
        warn!(dropped, "save_callbacks_dropped");
    }
    let mut scheduler = Scheduler::restore(snapshot)
        .map_err(|error| validation_err("scheduler", error.to_string()))?;

    for animal in reconciled.released_animals {
        let moving = world
            .component::<Walker>(animal)
            .is_some_and(Walker::is_moving);
        let tick = Callback::AnimalTick { animal };
        if !moving && !scheduler.has_matching(|callback| *callback == tick) {
            scheduler.add_callback(tick, 1, None);
        }
    }
    for (collector, target) in reconciled.orphaned_waiters {
        let signal = Callback::TargetStopped { collector, target };
        if !scheduler.has_matching(|callback| *callback == signal) {
            scheduler.add_callback(signal, 1, None);
        }
    }
    scheduler.mark_late_init_pending();

    Ok(RestoredGame {
        world,
        scheduler,
        camera,
        local_player,
        main_island,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::app::gameplay::commands::Command;
    use crate::app::gameplay::session::{new_session_with, Session, SessionConfig};
    use crate::app::gameplay::types::RunLength;

    fn sample_session() -> Session {
        let mut session = new_session_with(SessionConfig::default()).expect("session");
        let issuer = session.local_player();
        let island = session.main_island();
        session
            .execute(Command::Build {
                issuer,
                def: "building.tree".to_string(),
                x: 9,
                y: 9,
                island,
                settlement: None,
            })
            .expect("tree");
        session
            .execute(Command::Build {
                issuer,
                def: "building.hunter".to_string(),
                x: 10,
                y: 10,
                island,
                settlement: None,
            })
            .expect("hunter");
        session
            .execute(Command::CreateUnit {
                issuer: None,
                island,
                def: "unit.wild_animal".to_string(),
                x: 12,
                y: 12,
            })
            .expect("animal");
        session.run(RunLength::Ticks(5)).expect("run");
        session
    }

    fn sample_save_game() -> (SaveGame, GameDefs) {
        let session = sample_session();
        let save = build_save_game(
            session.world(),
            session.scheduler(),
            session.camera(),
            session.local_player(),
            session.main_island(),
            session.defs().content_hash(),
        );
        (save, session.defs().clone())
    }

    fn index_of(save: &SaveGame, predicate: impl Fn(&WorldObject) -> bool) -> usize {
        save.objects
            .iter()
            .position(predicate)
            .expect("object in save")
    }

    #[test]
    fn save_game_roundtrip_json_preserves_objects_and_queue() {
        let (save, _) = sample_save_game();
        let json = serde_json::to_string(&save).expect("serialize");
        let decoded = parse_save_game_json(&json).expect("parse");
        assert_eq!(decoded, save);
    }

    #[test]
    fn write_and_read_save_through_disk() {
        let (save, _) = sample_save_game();
        let temp = tempfile::TempDir::new().expect("tempdir");
        let path = temp.path().join("saves").join("slot.json");
        write_save_game(&path, &save).expect("write");
        assert_eq!(read_save_game(&path).expect("read"), save);
    }

    #[test]
    fn parse_save_game_json_reports_missing_required_field_path() {
        let (save, _) = sample_save_game();
        let mut value = serde_json::to_value(save).expect("to_value");
        value
            .as_object_mut()
            .expect("save object")
            .remove("save_version");
        let raw = serde_json::to_string(&value).expect("json");

        let error = parse_save_game_json(&raw).expect_err("missing field should fail");
        assert!(error.contains("parse save json"));
        assert!(error.contains("save_version"));
        assert!(error.contains("missing field"));
    }

    #[test]
    fn parse_save_game_json_reports_type_mismatch_path() {
        let (save, _) = sample_save_game();
        let mut value = serde_json::to_value(save).expect("to_value");
        value["scheduler"]["cur_tick"] = json!("oops");
        let raw = serde_json::to_string(&value).expect("json");

        let error = parse_save_game_json(&raw).expect_err("type mismatch should fail");
        assert!(error.contains("parse save json at scheduler.cur_tick"));
    }

    #[test]
    fn validation_rejects_version_and_content_hash() {
        let (mut save, defs) = sample_save_game();
        save.save_version = 99;
        let error = validate_save_game(&save, &defs).expect_err("version");
        assert!(error.contains("save_version"));

        let (mut save, defs) = sample_save_game();
        save.content_hash = "0".repeat(64);
        let error = validate_save_game(&save, &defs).expect_err("hash");
        assert!(error.contains("content_hash"));
    }

    #[test]
    fn validation_rejects_duplicate_ids_and_stale_allocator() {
        let (mut save, defs) = sample_save_game();
        let duplicate = save.objects[0].clone();
        save.objects.push(duplicate);
        let error = validate_save_game(&save, &defs).expect_err("duplicate");
        assert!(error.contains("duplicate worldid"));

        let (mut save, defs) = sample_save_game();
        save.next_worldid = 1;
        let error = validate_save_game(&save, &defs).expect_err("allocator");
        assert!(error.contains("next_worldid"));
    }

    #[test]
    fn validation_rejects_missing_owner_and_bad_camera() {
        let (mut save, defs) = sample_save_game();
        let hunter = index_of(&save, |object| object.def_name() == Some("building.hunter"));
        save.objects[hunter].owner = Some(WorldId(777));
        let error = validate_save_game(&save, &defs).expect_err("owner");
        assert!(error.contains(&format!("objects[{hunter}].owner")));
        assert!(error.contains("unknown worldid 777"));

        let (mut save, defs) = sample_save_game();
        save.camera.zoom = f32::NAN;
        let error = validate_save_game(&save, &defs).expect_err("camera");
        assert!(error.contains("camera.zoom"));
    }

    #[test]
    fn validation_rejects_working_collector_without_job() {
        let (mut save, defs) = sample_save_game();
        let collector = index_of(&save, |object| object.has::<Collector>());
        let component = save.objects[collector]
            .get_mut::<Collector>()
            .expect("collector");
        component.state = CollectorState::Working;
        component.job = None;
        let error = validate_save_game(&save, &defs).expect_err("job");
        assert!(error.contains("components.collector.job"));
    }

    #[test]
    fn validation_rejects_tick_mismatch_and_shared_tiles() {
        let (mut save, defs) = sample_save_game();
        save.tick += 1;
        let error = validate_save_game(&save, &defs).expect_err("tick");
        assert!(error.contains("scheduler.cur_tick"));

        let (mut save, defs) = sample_save_game();
        let tree = index_of(&save, |object| object.def_name() == Some("building.tree"));
        if let ObjectKind::Building { position, .. } = &mut save.objects[tree].kind {
            *position = Point::new(10, 10);
        }
        let error = validate_save_game(&save, &defs).expect_err("tile");
        assert!(error.contains("already occupied"));
    }

    #[test]
    fn restore_drops_vanished_soft_references() {
        let (mut save, defs) = sample_save_game();
        let hunter_index = index_of(&save, |object| object.def_name() == Some("building.hunter"));
        let hunter = save.objects[hunter_index].id;
        let collector_index = index_of(&save, |object| object.has::<Collector>());
        let collector = save.objects.remove(collector_index).id;
        let animal_index = index_of(&save, |object| object.has::<Wildlife>());
        let animal = save.objects[animal_index].id;
        if let Some(wildlife) = save.objects[animal_index].get_mut::<Wildlife>() {
            wildlife.stop_listener = Some(collector);
            wildlife.halted = true;
        }

        let restored = restore_save_game(save, &defs).expect("restore");
        let collecting = restored
            .world
            .component::<Collecting>(hunter)
            .expect("collecting");
        assert!(collecting.collectors.is_empty());
        let wildlife = restored
            .world
            .component::<Wildlife>(animal)
            .expect("wildlife");
        assert_eq!(wildlife.stop_listener, None);
        assert!(!wildlife.halted);
        assert!(restored
            .scheduler
            .entries()
            .all(|entry| entry.callback.subject() != collector));
        assert!(restored.scheduler.late_init_pending());
    }

    #[test]
    fn restore_rebuilds_tile_index_and_allocator() {
        let (save, defs) = sample_save_game();
        let next_worldid = save.next_worldid;
        let hunter = save.objects[index_of(&save, |object| {
            object.def_name() == Some("building.hunter")
        })]
        .id;
        let island = save.main_island;
        let restored = restore_save_game(save, &defs).expect("restore");
        assert_eq!(
            restored.world.tile_occupant(island, Point::new(10, 10)),
            Some(hunter)
        );
        assert_eq!(restored.world.next_worldid(), next_worldid);
    }
}
