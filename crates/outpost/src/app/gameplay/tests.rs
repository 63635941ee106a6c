use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use engine::{PointerButton, PointerEvent, ScreenPoint, SpriteViewport, WorldId};
use tempfile::TempDir;

use super::components::{Collector, CollectorState, Producer, ProductionState, Selectable, Storage};
use super::systems::Callback;
use super::*;

const WINDOW: (u32, u32) = (640, 480);

fn config() -> SessionConfig {
    SessionConfig::default()
}

fn fresh() -> Session {
    new_session_with(config()).expect("session")
}

fn save_path(temp: &TempDir, name: &str) -> PathBuf {
    temp.path().join(format!("{name}.save.json"))
}

fn reload(session: &Session, path: &Path) -> Session {
    session.save(path).expect("save");
    load_session_with(path, config()).expect("load")
}

fn build(session: &mut Session, def: &str, x: i32, y: i32) -> WorldId {
    build_in(session, def, x, y, None)
}

fn build_in(
    session: &mut Session,
    def: &str,
    x: i32,
    y: i32,
    settlement: Option<WorldId>,
) -> WorldId {
    Command::Build {
        issuer: session.local_player(),
        def: def.to_string(),
        x,
        y,
        island: session.main_island(),
        settlement,
    }
    .execute(session)
    .expect("build")
    .spawned()
    .expect("spawned")
}

fn create_unit(
    session: &mut Session,
    owner: Option<WorldId>,
    def: &str,
    x: i32,
    y: i32,
) -> WorldId {
    Command::CreateUnit {
        issuer: owner,
        island: session.main_island(),
        def: def.to_string(),
        x,
        y,
    }
    .execute(session)
    .expect("create unit")
    .spawned()
    .expect("spawned")
}

fn producer(session: &Session, building: WorldId) -> Producer {
    session
        .world()
        .component::<Producer>(building)
        .cloned()
        .expect("producer")
}

fn producer_tick_count(session: &Session, building: WorldId) -> usize {
    session
        .scheduler()
        .entries()
        .filter(|entry| entry.callback == Callback::ProducerTick { building })
        .count()
}

fn collector_of(session: &Session, building: WorldId) -> WorldId {
    session
        .world()
        .component::<components::Collecting>(building)
        .and_then(|collecting| collecting.collectors.first().copied())
        .expect("collector")
}

fn collector_state(session: &Session, collector: WorldId) -> CollectorState {
    session
        .world()
        .component::<Collector>(collector)
        .map(|component| component.state)
        .expect("collector state")
}

fn screen_of(viewport: &SpriteViewport, x: i32, y: i32) -> ScreenPoint {
    viewport.screen_position_of(Point::new(x, y).to_world())
}

fn click(session: &mut Session, viewport: &SpriteViewport, at: ScreenPoint) {
    session.handle_pointer(&PointerEvent::pressed(PointerButton::Left, at), viewport);
    session.handle_pointer(&PointerEvent::released(PointerButton::Left, at), viewport);
}

#[test]
fn save_then_load_is_observationally_identical() {
    let temp = TempDir::new().expect("tempdir");
    let mut session = fresh();
    scenarios::setup(&mut session, Scenario::Lumberjack).expect("lumberjack");
    scenarios::setup(&mut session, Scenario::Hunter).expect("hunter");
    session.run(RunLength::Ticks(77)).expect("run");

    let mut loaded = reload(&session, &save_path(&temp, "roundtrip"));
    loaded.before_ticking();
    assert_eq!(loaded.cur_tick(), session.cur_tick());
    assert_eq!(loaded.world().next_worldid(), session.world().next_worldid());
    assert_eq!(
        loaded.world().objects().collect::<Vec<_>>(),
        session.world().objects().collect::<Vec<_>>()
    );
    assert_eq!(loaded.scheduler().snapshot(), session.scheduler().snapshot());

    session.run(RunLength::Ticks(300)).expect("run original");
    loaded.run(RunLength::Ticks(300)).expect("run loaded");
    assert_eq!(
        loaded.world().objects().collect::<Vec<_>>(),
        session.world().objects().collect::<Vec<_>>()
    );
}

#[test]
fn set_inactive_then_toggle_keeps_progress_and_resumes() {
    let mut session = fresh();
    let tree = build(&mut session, "building.tree", 5, 5);
    session.run(RunLength::Ticks(5)).expect("run");
    let before = producer(&session, tree).productions[0].clone();
    assert_eq!(before.state, ProductionState::Producing);
    assert!(before.progress_ticks > 0);

    Command::SetActive {
        building: tree,
        active: false,
    }
    .execute(&mut session)
    .expect("set inactive");
    assert_eq!(producer_tick_count(&session, tree), 0);
    Command::ToggleActive { building: tree }
        .execute(&mut session)
        .expect("toggle");

    let resumed = producer(&session, tree);
    assert!(resumed.is_active());
    assert_eq!(resumed.productions[0].state, ProductionState::Producing);
    assert_eq!(resumed.productions[0].progress_ticks, before.progress_ticks);
    assert_eq!(producer_tick_count(&session, tree), 1);

    session.run(RunLength::Ticks(1)).expect("run");
    assert_eq!(
        producer(&session, tree).productions[0].progress_ticks,
        before.progress_ticks + 1
    );
}

#[test]
fn inactive_production_survives_reload() {
    let temp = TempDir::new().expect("tempdir");
    let mut session = fresh();
    let lumberjack = build(&mut session, "building.lumberjack", 10, 10);
    Command::SetActive {
        building: lumberjack,
        active: false,
    }
    .execute(&mut session)
    .expect("set inactive");
    session.run(RunLength::Ticks(1)).expect("run");

    let mut loaded = reload(&session, &save_path(&temp, "inactive"));
    assert!(!producer(&loaded, lumberjack).is_active());
    assert_eq!(producer_tick_count(&loaded, lumberjack), 0);

    Command::ToggleActive {
        building: lumberjack,
    }
    .execute(&mut loaded)
    .expect("toggle after load");
    assert!(producer(&loaded, lumberjack).is_active());
    assert_eq!(producer_tick_count(&loaded, lumberjack), 1);
    Command::SetActive {
        building: lumberjack,
        active: true,
    }
    .execute(&mut loaded)
    .expect("set active twice");
    assert_eq!(producer_tick_count(&loaded, lumberjack), 1);
}

fn producing_state_survives_reload(ticks_after_load: u64) {
    let temp = TempDir::new().expect("tempdir");
    let mut session = fresh();
    let layout = scenarios::setup(&mut session, Scenario::Lumberjack).expect("lumberjack");
    let lumberjack = *layout.buildings.last().expect("lumberjack");

    let mut waited = 0;
    while producer(&session, lumberjack).productions[0].state != ProductionState::Producing {
        session.run(RunLength::Ticks(1)).expect("run");
        waited += 1;
        assert!(waited < 1_000, "lumberjack never started producing");
    }

    let mut loaded = reload(&session, &save_path(&temp, "producing"));
    let production = producer(&loaded, lumberjack).productions[0].clone();
    assert_eq!(production.state, ProductionState::Producing);
    assert_eq!(
        production.progress_ticks,
        producer(&session, lumberjack).productions[0].progress_ticks
    );

    loaded
        .run(RunLength::Ticks(ticks_after_load))
        .expect("run after load");
    loaded
        .save(&save_path(&temp, "producing_again"))
        .expect("second save");
    let again = load_session_with(&save_path(&temp, "producing_again"), config())
        .expect("second load");
    assert_eq!(producer_tick_count(&again, lumberjack), 1);
    assert_eq!(producer(&again, lumberjack), producer(&loaded, lumberjack));
}

#[test]
fn producing_state_survives_fast_reload() {
    producing_state_survives_reload(2);
}

#[test]
fn producing_state_survives_slow_reload() {
    producing_state_survives_reload(100);
}

fn observe_hunter_lifecycle(reload_between_transitions: bool) -> Vec<CollectorState> {
    let temp = TempDir::new().expect("tempdir");
    let path = save_path(&temp, "hunter");
    let mut session = fresh();
    let layout = scenarios::setup(&mut session, Scenario::Hunter).expect("hunter");
    let hunter = layout.buildings[0];
    let collector = collector_of(&session, hunter);

    let mut observed = vec![collector_state(&session, collector)];
    for _ in 0..3_000 {
        session.run(RunLength::Ticks(1)).expect("run");
        let state = collector_state(&session, collector);
        if observed.last() == Some(&state) {
            continue;
        }
        observed.push(state);
        if reload_between_transitions {
            session = reload(&session, &path);
            assert_eq!(collector_state(&session, collector), state);
        }
        if observed.len() == 6 {
            break;
        }
    }

    let storage = session
        .world()
        .component::<Storage>(hunter)
        .expect("hunter storage");
    let delivered =
        storage.inventory.amount(ResourceId::Deer) + storage.inventory.amount(ResourceId::Food);
    assert!(delivered >= 1, "hunter never received its catch");
    observed
}

const HUNTER_LIFECYCLE: [CollectorState; 6] = [
    CollectorState::Idle,
    CollectorState::WaitingForAnimalToStop,
    CollectorState::MovingToTarget,
    CollectorState::Working,
    CollectorState::MovingHome,
    CollectorState::Idle,
];

#[test]
fn hunter_lifecycle_runs_in_order() {
    assert_eq!(observe_hunter_lifecycle(false), HUNTER_LIFECYCLE);
}

#[test]
fn hunter_lifecycle_runs_in_order_with_reload_between_transitions() {
    assert_eq!(observe_hunter_lifecycle(true), HUNTER_LIFECYCLE);
}

#[test]
fn settler_finds_main_square_built_after_reload() {
    let temp = TempDir::new().expect("tempdir");
    let mut session = fresh();
    let settlement = Command::FoundSettlement {
        issuer: session.local_player(),
        island: session.main_island(),
        name: "Harbor".to_string(),
    }
    .execute(&mut session)
    .expect("found")
    .spawned();
    let tent = build_in(&mut session, "building.residential", 20, 20, settlement);
    session.run(RunLength::Ticks(1)).expect("run");

    let mut loaded = reload(&session, &save_path(&temp, "settler"));
    let square = build_in(&mut loaded, "building.main_square", 22, 20, settlement);
    let stocked = loaded
        .add_to_storage(
            square,
            ResourceAmount {
                resource: ResourceId::Food,
                amount: 120,
            },
        )
        .expect("stock");
    assert_eq!(stocked, 120);
    let settlement = settlement.expect("settlement");
    assert_eq!(
        loaded.world().settlement_buildings(settlement),
        vec![tent, square]
    );

    loaded.run(RunLength::Seconds(300.0)).expect("run five minutes");
    let tent_object = loaded.world().get(tent).expect("tent still stands");
    assert_eq!(tent_object.def_name(), Some("building.residential"));
    let left = loaded
        .world()
        .component::<Storage>(square)
        .expect("square storage")
        .inventory
        .amount(ResourceId::Food);
    assert!(left < 120);
    assert!(left > 0);
}

#[test]
fn unsupplied_settler_decays_into_a_ruin() {
    let mut session = fresh();
    let settlement = Command::FoundSettlement {
        issuer: session.local_player(),
        island: session.main_island(),
        name: "Outskirts".to_string(),
    }
    .execute(&mut session)
    .expect("found")
    .spawned();
    let tent = build_in(&mut session, "building.residential", 20, 20, settlement);
    session.run(RunLength::Seconds(60.0)).expect("run");

    assert!(!session.world().contains(tent));
    let ruin = session
        .world()
        .tile_occupant(session.main_island(), Point::new(20, 20))
        .expect("ruin on the tent's tile");
    assert_eq!(
        session.world().get(ruin).expect("ruin").def_name(),
        Some("building.ruin")
    );
}

#[test]
fn pointer_selection_and_move_orders_through_session() {
    let mut session = fresh();
    let local = session.local_player();
    let soldier = create_unit(&mut session, Some(local), "unit.soldier", 31, 32);
    let scout = create_unit(&mut session, Some(local), "unit.scout", 33, 32);
    let viewport = session.scene_viewport(WINDOW);

    let from = ScreenPoint::new(
        screen_of(&viewport, 31, 32).x - 20,
        screen_of(&viewport, 31, 32).y - 20,
    );
    let to = ScreenPoint::new(
        screen_of(&viewport, 33, 32).x + 20,
        screen_of(&viewport, 33, 32).y + 20,
    );
    session.handle_pointer(&PointerEvent::pressed(PointerButton::Left, from), &viewport);
    session.handle_pointer(&PointerEvent::dragged(PointerButton::Left, to), &viewport);
    assert!(session.hud().selection_rect.is_some());
    session.handle_pointer(&PointerEvent::released(PointerButton::Left, to), &viewport);

    let expected: BTreeSet<WorldId> = [soldier, scout].into_iter().collect();
    assert_eq!(session.selection(), Some(&expected));
    assert_eq!(session.hud().menu, MenuState::MultiSelect(expected.clone()));
    assert_eq!(session.tool(), ToolKind::Attacking);

    let target = screen_of(&viewport, 32, 36);
    session.handle_pointer(&PointerEvent::pressed(PointerButton::Right, target), &viewport);
    for unit in [soldier, scout] {
        let walker = session
            .world()
            .component::<components::Walker>(unit)
            .expect("walker");
        assert_eq!(walker.destination, Some(Point::new(32, 36)));
    }

    session.set_cursor(ToolKind::Navigation);
    assert_eq!(session.selection(), Some(&expected));

    session.set_cursor(ToolKind::Default);
    let viewport = session.scene_viewport(WINDOW);
    let scout_at = viewport.screen_position_of(
        session
            .world()
            .position_of(scout)
            .expect("scout position")
            .to_world(),
    );
    click(&mut session, &viewport, scout_at);
    let only_scout: BTreeSet<WorldId> = [scout].into_iter().collect();
    assert_eq!(session.selection(), Some(&only_scout));
    assert_eq!(session.tool(), ToolKind::Default);
    assert_eq!(session.hud().menu, MenuState::Single(scout));

    session.set_cursor(ToolKind::Navigation);
    assert_eq!(session.selection().map(|selection| selection.len()), Some(0));
    assert!(!session
        .world()
        .component::<Selectable>(scout)
        .expect("selectable")
        .selected);
}

#[test]
fn right_click_leaves_rival_units_in_place() {
    let mut session = fresh();
    let rival = session.add_player("rival");
    let soldier = create_unit(&mut session, Some(rival), "unit.soldier", 31, 32);
    let viewport = session.scene_viewport(WINDOW);

    session.toggle_health_bars();
    assert!(session.hud().health_bars_visible);
    click(&mut session, &viewport, screen_of(&viewport, 31, 32));
    let only_soldier: BTreeSet<WorldId> = [soldier].into_iter().collect();
    assert_eq!(session.selection(), Some(&only_soldier));
    assert!(!session.hud().health_bars_visible);
    assert_eq!(session.tool(), ToolKind::Default);

    let target = screen_of(&viewport, 31, 38);
    session.handle_pointer(&PointerEvent::pressed(PointerButton::Right, target), &viewport);
    let walker = session
        .world()
        .component::<components::Walker>(soldier)
        .expect("walker");
    assert_eq!(walker.destination, None);

    session.run(RunLength::Ticks(40)).expect("run");
    assert_eq!(session.world().position_of(soldier), Some(Point::new(31, 32)));

    let refused = Command::Act {
        issuer: session.local_player(),
        unit: soldier,
        x: 31.0,
        y: 38.0,
    }
    .execute(&mut session)
    .expect_err("foreign unit");
    assert_eq!(
        refused,
        CommandError::NotOwner {
            unit: soldier,
            issuer: session.local_player(),
        }
    );
    Command::Act {
        issuer: rival,
        unit: soldier,
        x: 31.0,
        y: 38.0,
    }
    .execute(&mut session)
    .expect("owner may move its unit");
}

#[test]
fn rejected_commands_leave_the_world_alone() {
    let mut session = fresh();
    let tree = build(&mut session, "building.tree", 3, 3);
    let objects = session.world().len();

    let occupied = Command::Build {
        issuer: session.local_player(),
        def: "building.hunter".to_string(),
        x: 3,
        y: 3,
        island: session.main_island(),
        settlement: None,
    }
    .execute(&mut session)
    .expect_err("occupied");
    assert_eq!(
        occupied,
        CommandError::TileOccupied {
            island: session.main_island(),
            x: 3,
            y: 3,
            occupant: tree,
        }
    );
    let outside = Command::Build {
        issuer: session.local_player(),
        def: "building.tree".to_string(),
        x: -1,
        y: 0,
        island: session.main_island(),
        settlement: None,
    }
    .execute(&mut session)
    .expect_err("outside");
    assert!(matches!(outside, CommandError::OutOfBounds { .. }));
    let unknown = Command::ToggleActive {
        building: WorldId(9_999),
    }
    .execute(&mut session)
    .expect_err("unknown");
    assert!(matches!(unknown, CommandError::Registry(_)));
    assert_eq!(session.world().len(), objects);
}

#[test]
fn end_keeps_or_drops_the_map_and_stops_ticking() {
    let temp = TempDir::new().expect("tempdir");
    let mut kept = fresh();
    build(&mut kept, "building.tree", 4, 4);
    let objects = kept.world().len();
    kept.end(true);
    assert_eq!(kept.lifecycle(), Lifecycle::Ended);
    assert_eq!(kept.selection(), None);
    assert_eq!(kept.world().len(), objects);
    assert!(kept.scheduler().is_empty());
    assert!(matches!(
        kept.run(RunLength::Ticks(1)),
        Err(SessionError::Ended)
    ));
    assert!(matches!(
        kept.save(&save_path(&temp, "ended")),
        Err(SessionError::Ended)
    ));
    assert!(!save_path(&temp, "ended").exists());

    let mut dropped = fresh();
    dropped.end(false);
    assert!(dropped.world().is_empty());
    assert_eq!(dropped.selection(), None);
}

#[test]
fn load_failure_reports_path_and_keeps_nothing() {
    let temp = TempDir::new().expect("tempdir");
    let path = save_path(&temp, "broken");
    std::fs::write(&path, "{\"save_version\": 1}").expect("write");
    let error = load_session_with(&path, config()).expect_err("broken save");
    let message = error.to_string();
    assert!(message.contains("load failed"));
    assert!(message.contains("missing field"));
}
