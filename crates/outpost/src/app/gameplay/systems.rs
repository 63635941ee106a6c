use engine::{RegistryError, Scheduler, WorldId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::components::{
    Collecting, Collector, CollectorState, Job, Producer, Production, ProductionState, Settler,
    Storage, Walker, Wildlife, COLLECTOR_SEARCH_INTERVAL_TICKS, SETTLER_MAX_UNSUPPLIED,
};
use super::defs::{GameDefs, ObjectTemplate, SUPPLIES_SETTLERS_TAG};
use super::types::{Point, ResourceAmount, ResourceId};
use super::world::{ObjectKind, World, WorldObject};

const WANDER_OFFSETS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Scheduled work. Every variant names the object it acts on so that destroying an object can
/// drop its pending callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Callback {
    ProducerTick { building: WorldId },
    CollectorSearch { collector: WorldId },
    TargetStopped { collector: WorldId, target: WorldId },
    FinishWork { collector: WorldId },
    WalkStep { unit: WorldId },
    AnimalTick { animal: WorldId },
    SettlerTick { building: WorldId },
}

impl Callback {
    pub fn subject(&self) -> WorldId {
        match *self {
            Self::ProducerTick { building } | Self::SettlerTick { building } => building,
            Self::CollectorSearch { collector }
            | Self::TargetStopped { collector, .. }
            | Self::FinishWork { collector } => collector,
            Self::WalkStep { unit } => unit,
            Self::AnimalTick { animal } => animal,
        }
    }
}

pub struct SimContext<'a> {
    pub world: &'a mut World,
    pub scheduler: &'a mut Scheduler<Callback>,
    pub defs: &'a GameDefs,
}

/// Advances the scheduler by one tick and runs everything due on it.
pub fn run_tick(ctx: &mut SimContext<'_>) {
    ctx.scheduler.begin_tick();
    while let Some(due) = ctx.scheduler.pop_due() {
        dispatch(ctx, due.callback);
    }
    ctx.scheduler.end_tick();
}

/// Late-init hook: walker routes are not saved, so they are planned again from position and
/// destination before the first tick after a load.
pub fn before_ticking(ctx: &mut SimContext<'_>) -> usize {
    let mut replanned = 0;
    for id in ctx.world.ids() {
        let Ok(object) = ctx.world.get_mut(id) else {
            continue;
        };
        let Some(position) = object.position() else {
            continue;
        };
        if let Some(walker) = object.get_mut::<Walker>() {
            if walker.is_moving() {
                walker.plan_route(position);
                replanned += 1;
            }
        }
    }
    info!(walkers = replanned, "late_init_complete");
    replanned
}

fn dispatch(ctx: &mut SimContext<'_>, callback: Callback) {
    if !ctx.world.contains(callback.subject()) {
        debug!(callback = ?callback, "callback_subject_missing");
        return;
    }
    match callback {
        Callback::ProducerTick { building } => producer_tick(ctx, building),
        Callback::CollectorSearch { collector } => collector_search(ctx, collector),
        Callback::TargetStopped { collector, target } => target_stopped(ctx, collector, target),
        Callback::FinishWork { collector } => finish_work(ctx, collector),
        Callback::WalkStep { unit } => walk_step(ctx, unit),
        Callback::AnimalTick { animal } => animal_tick(ctx, animal),
        Callback::SettlerTick { building } => settler_tick(ctx, building),
    }
}

fn producer_tick(ctx: &mut SimContext<'_>, building: WorldId) {
    let Ok(object) = ctx.world.get_mut(building) else {
        return;
    };
    let Some(mut producer) = object.get::<Producer>().cloned() else {
        return;
    };
    if !producer.is_active() {
        return;
    }
    let Some(storage) = object.get_mut::<Storage>() else {
        warn!(worldid = building.0, "producer_without_storage");
        return;
    };
    for production in &mut producer.productions {
        advance_production(production, storage);
    }
    if let Some(slot) = object.get_mut::<Producer>() {
        *slot = producer;
    }
}

pub(crate) fn advance_production(production: &mut Production, storage: &mut Storage) {
    match production.state {
        ProductionState::Paused => {}
        ProductionState::Producing => {
            production.progress_ticks += 1;
            if production.progress_ticks >= production.line.duration_ticks {
                for output in &production.line.outputs {
                    storage.inventory.add(output.resource, output.amount);
                }
                production.progress_ticks = 0;
                production.state = ProductionState::None;
            }
        }
        ProductionState::None
        | ProductionState::WaitingForResources
        | ProductionState::InventoryFull => {
            let has_inputs = production
                .line
                .inputs
                .iter()
                .all(|input| storage.available(input.resource) >= input.amount);
            let outputs_fit = production
                .line
                .outputs
                .iter()
                .all(|output| storage.inventory.free_space(output.resource) >= output.amount);
            production.state = if !has_inputs {
                ProductionState::WaitingForResources
            } else if !outputs_fit {
                ProductionState::InventoryFull
            } else {
                for input in &production.line.inputs {
                    storage.inventory.remove(input.resource, input.amount);
                }
                ProductionState::Producing
            };
        }
    }
}

/// Pauses or resumes a producer. Returns `Ok(false)` when the building has no producer.
///
/// The tick callback is looked up in the scheduler rather than tracked on the component, so
/// toggling straight after a load never leaves two callbacks or none.
pub fn set_active(
    ctx: &mut SimContext<'_>,
    building: WorldId,
    active: bool,
) -> Result<bool, RegistryError> {
    let object = ctx.world.get_mut(building)?;
    let Some(producer) = object.get_mut::<Producer>() else {
        return Ok(false);
    };
    producer.active = active;
    for production in &mut producer.productions {
        if active {
            if production.state == ProductionState::Paused {
                production.state = production
                    .paused_from
                    .take()
                    .unwrap_or(ProductionState::None);
            }
        } else if production.state != ProductionState::Paused {
            production.paused_from = Some(production.state);
            production.state = ProductionState::Paused;
        }
    }

    let tick = Callback::ProducerTick { building };
    if active {
        if !ctx.scheduler.has_matching(|callback| *callback == tick) {
            ctx.scheduler.add_callback(tick, 1, Some(1));
        }
    } else {
        ctx.scheduler.remove_matching(|callback| *callback == tick);
    }
    info!(worldid = building.0, active, "producer_active_changed");
    Ok(true)
}

fn set_collector_state(ctx: &mut SimContext<'_>, collector: WorldId, state: CollectorState) {
    if let Some(component) = ctx.world.component_mut::<Collector>(collector) {
        debug!(
            collector = collector.0,
            from = ?component.state,
            to = ?state,
            "collector_state_changed"
        );
        component.state = state;
    }
}

fn schedule_search(ctx: &mut SimContext<'_>, collector: WorldId) {
    ctx.scheduler.add_callback(
        Callback::CollectorSearch { collector },
        COLLECTOR_SEARCH_INTERVAL_TICKS,
        None,
    );
}

fn collector_search(ctx: &mut SimContext<'_>, collector: WorldId) {
    let Some((state, home)) = ctx
        .world
        .component::<Collector>(collector)
        .map(|component| (component.state, component.home))
    else {
        return;
    };
    if state != CollectorState::Idle {
        debug!(collector = collector.0, state = ?state, "collector_search_skipped");
        return;
    }
    match find_collect_target(ctx.world, home) {
        Some(job) => begin_job(ctx, collector, job),
        None => schedule_search(ctx, collector),
    }
}

/// Nearest object within the home's collecting radius that can hand over one of the home's
/// production inputs. Ties go to the lowest worldid.
pub fn find_collect_target(world: &World, home: WorldId) -> Option<Job> {
    let home_object = world.get(home).ok()?;
    let origin = home_object.position()?;
    let island = home_object.island()?;
    let radius = home_object.get::<Collecting>()?.radius;
    let home_storage = home_object.get::<Storage>()?;
    let wanted = home_object
        .get::<Producer>()?
        .input_resources()
        .into_iter()
        .filter(|resource| home_storage.inventory.free_space(*resource) > 0)
        .collect::<Vec<_>>();
    if wanted.is_empty() {
        return None;
    }

    let mut best: Option<(u32, WorldId, ResourceId)> = None;
    for object in world.objects() {
        if object.id == home || object.island() != Some(island) {
            continue;
        }
        let Some(position) = object.position() else {
            continue;
        };
        let distance = origin.chebyshev_distance(position);
        if distance > radius {
            continue;
        }
        let Some(storage) = object.get::<Storage>() else {
            continue;
        };
        let wildlife = object.get::<Wildlife>();
        if wildlife.is_some_and(|animal| animal.stop_listener.is_some()) {
            continue;
        }
        let provides = |resource: ResourceId| {
            wildlife.is_some()
                || object
                    .get::<Producer>()
                    .is_some_and(|producer| producer.produces(resource))
        };
        let Some(resource) = wanted
            .iter()
            .copied()
            .find(|resource| provides(*resource) && storage.available(*resource) >= 1)
        else {
            continue;
        };
        if best.map_or(true, |(best_distance, best_id, _)| {
            (distance, object.id) < (best_distance, best_id)
        }) {
            best = Some((distance, object.id, resource));
        }
    }

    best.map(|(_, target, resource)| Job {
        target,
        resource,
        amount: 1,
    })
}

fn begin_job(ctx: &mut SimContext<'_>, collector: WorldId, job: Job) {
    let reserved = ctx
        .world
        .component_mut::<Storage>(job.target)
        .is_some_and(|storage| storage.reserve(job.resource, job.amount));
    if !reserved {
        schedule_search(ctx, collector);
        return;
    }
    let moving_target = ctx.world.component::<Wildlife>(job.target).is_some();
    if let Some(component) = ctx.world.component_mut::<Collector>(collector) {
        component.job = Some(job);
    }
    debug!(
        collector = collector.0,
        target = job.target.0,
        resource = job.resource.as_str(),
        "collector_job_started"
    );

    if moving_target {
        set_collector_state(ctx, collector, CollectorState::WaitingForAnimalToStop);
        request_stop(ctx, job.target, collector);
    } else {
        set_collector_state(ctx, collector, CollectorState::MovingToTarget);
        walk_to_object(ctx, collector, job.target);
    }
}

fn walk_to_object(ctx: &mut SimContext<'_>, collector: WorldId, target: WorldId) {
    match ctx.world.position_of(target) {
        Some(position) => {
            if let Err(error) = start_walk(ctx, collector, position) {
                warn!(collector = collector.0, error = %error, "collector_walk_failed");
            }
        }
        None => return_home_empty(ctx, collector),
    }
}

fn target_stopped(ctx: &mut SimContext<'_>, collector: WorldId, target: WorldId) {
    let Some(component) = ctx.world.component::<Collector>(collector) else {
        return;
    };
    let waiting = component.state == CollectorState::WaitingForAnimalToStop
        && component.job.map(|job| job.target) == Some(target);
    if !waiting {
        debug!(
            collector = collector.0,
            target = target.0,
            "stale_target_stopped_ignored"
        );
        return;
    }
    set_collector_state(ctx, collector, CollectorState::MovingToTarget);
    walk_to_object(ctx, collector, target);
}

fn finish_work(ctx: &mut SimContext<'_>, collector: WorldId) {
    let Some(component) = ctx.world.component::<Collector>(collector) else {
        return;
    };
    if component.state != CollectorState::Working {
        return;
    }
    let Some(job) = component.job else {
        return_home_empty(ctx, collector);
        return;
    };
    let Some(storage) = ctx.world.component_mut::<Storage>(job.target) else {
        debug!(collector = collector.0, target = job.target.0, "collect_target_vanished");
        return_home_empty(ctx, collector);
        return;
    };
    let taken = storage.take_reserved(job.resource, job.amount);
    let remaining = storage.inventory.amount(job.resource);

    if ctx.world.component::<Wildlife>(job.target).is_some() {
        if remaining == 0 {
            if destroy_object(ctx, job.target).is_ok() {
                info!(animal = job.target.0, collector = collector.0, "animal_hunted");
            }
        } else {
            release_animal(ctx, job.target);
        }
    }

    if let Some(component) = ctx.world.component_mut::<Collector>(collector) {
        component.job = None;
        component.carried = (taken > 0).then_some(ResourceAmount {
            resource: job.resource,
            amount: taken,
        });
    }
    go_home(ctx, collector);
}

fn return_home_empty(ctx: &mut SimContext<'_>, collector: WorldId) {
    let job = ctx
        .world
        .component_mut::<Collector>(collector)
        .and_then(|component| {
            component.carried = None;
            component.job.take()
        });
    if let Some(job) = job {
        if let Some(storage) = ctx.world.component_mut::<Storage>(job.target) {
            storage.release(job.resource, job.amount);
        }
        let listening = ctx
            .world
            .component::<Wildlife>(job.target)
            .is_some_and(|animal| animal.stop_listener == Some(collector));
        if listening {
            release_animal(ctx, job.target);
        }
    }
    go_home(ctx, collector);
}

fn go_home(ctx: &mut SimContext<'_>, collector: WorldId) {
    let home = ctx
        .world
        .component::<Collector>(collector)
        .map(|component| component.home);
    let Some(home_position) = home.and_then(|home| ctx.world.position_of(home)) else {
        warn!(collector = collector.0, "collector_home_missing");
        if let Err(error) = destroy_object(ctx, collector) {
            warn!(collector = collector.0, error = %error, "collector_destroy_failed");
        }
        return;
    };
    set_collector_state(ctx, collector, CollectorState::MovingHome);
    if let Err(error) = start_walk(ctx, collector, home_position) {
        warn!(collector = collector.0, error = %error, "collector_walk_failed");
    }
}

fn unload(ctx: &mut SimContext<'_>, collector: WorldId) {
    let Some(component) = ctx.world.component_mut::<Collector>(collector) else {
        return;
    };
    let home = component.home;
    let carried = component.carried.take();
    component.job = None;
    if let Some(carried) = carried {
        let stored = ctx
            .world
            .component_mut::<Storage>(home)
            .map(|storage| storage.inventory.add(carried.resource, carried.amount))
            .unwrap_or(0);
        if stored < carried.amount {
            debug!(
                collector = collector.0,
                lost = carried.amount - stored,
                resource = carried.resource.as_str(),
                "collector_unload_overflow"
            );
        }
    }
    set_collector_state(ctx, collector, CollectorState::Idle);
    schedule_search(ctx, collector);
}

/// Sends `unit` towards `destination`. A unit that is already walking is retargeted without
/// queueing a second step callback.
pub fn start_walk(
    ctx: &mut SimContext<'_>,
    unit: WorldId,
    destination: Point,
) -> Result<bool, RegistryError> {
    let object = ctx.world.get_mut(unit)?;
    let Some(position) = object.position() else {
        return Ok(false);
    };
    let Some(walker) = object.get_mut::<Walker>() else {
        return Ok(false);
    };
    walker.destination = Some(destination);
    walker.plan_route(position);
    let step_ticks = u64::from(walker.step_ticks.max(1));

    let step = Callback::WalkStep { unit };
    if !ctx.scheduler.has_matching(|callback| *callback == step) {
        ctx.scheduler.add_callback(step, step_ticks, None);
    }
    Ok(true)
}

fn walk_step(ctx: &mut SimContext<'_>, unit: WorldId) {
    let Ok(object) = ctx.world.get_mut(unit) else {
        return;
    };
    let Some(position) = object.position() else {
        return;
    };
    let Some(walker) = object.get_mut::<Walker>() else {
        return;
    };
    let Some(destination) = walker.destination else {
        return;
    };
    if walker.route.is_empty() && position != destination {
        walker.plan_route(position);
    }
    let next = walker.route.pop_front();
    let arrived = walker.route.is_empty();
    if arrived {
        walker.destination = None;
    }
    let step_ticks = u64::from(walker.step_ticks.max(1));
    if let (Some(next), ObjectKind::Unit { position, .. }) = (next, &mut object.kind) {
        *position = next;
    }

    let stop_requested = object
        .get::<Wildlife>()
        .is_some_and(|animal| animal.stop_listener.is_some() && !animal.halted);
    if stop_requested {
        if let Some(walker) = object.get_mut::<Walker>() {
            walker.destination = None;
            walker.route.clear();
        }
        halt_animal(ctx, unit);
        return;
    }

    if arrived {
        on_arrival(ctx, unit);
    } else {
        ctx.scheduler
            .add_callback(Callback::WalkStep { unit }, step_ticks, None);
    }
}

fn on_arrival(ctx: &mut SimContext<'_>, unit: WorldId) {
    let collector = ctx
        .world
        .component::<Collector>(unit)
        .map(|component| (component.state, component.work_ticks, component.job));
    if let Some((state, work_ticks, job)) = collector {
        match state {
            CollectorState::MovingToTarget => {
                if job.is_some_and(|job| ctx.world.contains(job.target)) {
                    set_collector_state(ctx, unit, CollectorState::Working);
                    ctx.scheduler.add_callback(
                        Callback::FinishWork { collector: unit },
                        u64::from(work_ticks.max(1)),
                        None,
                    );
                } else {
                    return_home_empty(ctx, unit);
                }
            }
            CollectorState::MovingHome => unload(ctx, unit),
            state => debug!(collector = unit.0, state = ?state, "collector_arrival_ignored"),
        }
        return;
    }
    if let Some(graze_ticks) = ctx
        .world
        .component::<Wildlife>(unit)
        .map(|animal| animal.graze_ticks)
    {
        ctx.scheduler.add_callback(
            Callback::AnimalTick { animal: unit },
            u64::from(graze_ticks.max(1)),
            None,
        );
        return;
    }
    debug!(worldid = unit.0, "unit_arrived");
}

fn animal_tick(ctx: &mut SimContext<'_>, animal: WorldId) {
    let island = ctx.world.get(animal).ok().and_then(WorldObject::island);
    let Some(wildlife) = ctx.world.component_mut::<Wildlife>(animal) else {
        return;
    };
    if wildlife.halted || wildlife.stop_listener.is_some() {
        return;
    }
    let (dx, dy) = WANDER_OFFSETS[wildlife.wander_step as usize % WANDER_OFFSETS.len()];
    wildlife.wander_step = wildlife.wander_step.wrapping_add(1);
    let mut destination = Point::new(wildlife.home.x + dx, wildlife.home.y + dy);
    if let Some((width, height)) = island.and_then(|island| ctx.world.island_size(island)) {
        destination.x = destination.x.clamp(0, width - 1);
        destination.y = destination.y.clamp(0, height - 1);
    }
    if let Err(error) = start_walk(ctx, animal, destination) {
        warn!(animal = animal.0, error = %error, "animal_walk_failed");
    }
}

fn request_stop(ctx: &mut SimContext<'_>, animal: WorldId, listener: WorldId) {
    let moving = ctx
        .world
        .component::<Walker>(animal)
        .is_some_and(Walker::is_moving);
    if let Some(wildlife) = ctx.world.component_mut::<Wildlife>(animal) {
        wildlife.stop_listener = Some(listener);
    }
    if !moving {
        halt_animal(ctx, animal);
    }
}

fn halt_animal(ctx: &mut SimContext<'_>, animal: WorldId) {
    ctx.scheduler
        .remove_matching(|callback| *callback == Callback::AnimalTick { animal });
    let Some(wildlife) = ctx.world.component_mut::<Wildlife>(animal) else {
        return;
    };
    wildlife.halted = true;
    if let Some(collector) = wildlife.stop_listener {
        ctx.scheduler.add_callback(
            Callback::TargetStopped {
                collector,
                target: animal,
            },
            1,
            None,
        );
    }
    debug!(animal = animal.0, "animal_halted");
}

fn release_animal(ctx: &mut SimContext<'_>, animal: WorldId) {
    let moving = ctx
        .world
        .component::<Walker>(animal)
        .is_some_and(Walker::is_moving);
    let Some(wildlife) = ctx.world.component_mut::<Wildlife>(animal) else {
        return;
    };
    wildlife.stop_listener = None;
    wildlife.halted = false;
    let graze_ticks = u64::from(wildlife.graze_ticks.max(1));
    let tick = Callback::AnimalTick { animal };
    if !moving && !ctx.scheduler.has_matching(|callback| *callback == tick) {
        ctx.scheduler.add_callback(tick, graze_ticks, None);
    }
}

fn settler_tick(ctx: &mut SimContext<'_>, building: WorldId) {
    let Ok(object) = ctx.world.get(building) else {
        return;
    };
    let Some(mut settler) = object.get::<Settler>().cloned() else {
        return;
    };
    let supplier = object
        .settlement()
        .and_then(|settlement| find_supplier(ctx.world, ctx.defs, settlement, settler.consumes));

    match supplier {
        Some(supplier) => {
            if let Some(storage) = ctx.world.component_mut::<Storage>(supplier) {
                storage
                    .inventory
                    .remove(settler.consumes.resource, settler.consumes.amount);
            }
            settler.unsupplied = 0;
        }
        None => {
            settler.unsupplied += 1;
            debug!(
                worldid = building.0,
                unsupplied = settler.unsupplied,
                "settler_unsupplied"
            );
        }
    }

    if settler.unsupplied >= SETTLER_MAX_UNSUPPLIED {
        decay_to_ruin(ctx, building, &settler.ruin);
    } else if let Some(slot) = ctx.world.component_mut::<Settler>(building) {
        *slot = settler;
    }
}

fn find_supplier(
    world: &World,
    defs: &GameDefs,
    settlement: WorldId,
    consumes: ResourceAmount,
) -> Option<WorldId> {
    world
        .settlement_buildings(settlement)
        .into_iter()
        .find(|candidate| {
            let Ok(object) = world.get(*candidate) else {
                return false;
            };
            let supplies = object
                .def_name()
                .and_then(|def| defs.template(def))
                .is_some_and(|template| template.def.has_tag(SUPPLIES_SETTLERS_TAG));
            supplies
                && object
                    .get::<Storage>()
                    .is_some_and(|storage| storage.available(consumes.resource) >= consumes.amount)
        })
}

fn decay_to_ruin(ctx: &mut SimContext<'_>, building: WorldId, ruin: &str) {
    let Ok(object) = destroy_object(ctx, building) else {
        return;
    };
    let ObjectKind::Building {
        position,
        island,
        settlement,
        ..
    } = object.kind
    else {
        return;
    };
    let defs = ctx.defs;
    let Some(template) = defs.template(ruin) else {
        warn!(worldid = building.0, ruin, "ruin_def_missing");
        return;
    };
    let ruin_id = spawn_building(ctx, template, object.owner, island, settlement, position);
    info!(
        worldid = building.0,
        ruin = ruin_id.0,
        x = position.x,
        y = position.y,
        "settler_abandoned"
    );
}

/// Spawns a building with its collectors and the callbacks its components need.
pub fn spawn_building(
    ctx: &mut SimContext<'_>,
    template: &ObjectTemplate,
    owner: Option<WorldId>,
    island: WorldId,
    settlement: Option<WorldId>,
    position: Point,
) -> WorldId {
    let components = template.instantiate(position);
    let building = ctx.world.spawn(
        ObjectKind::Building {
            def: template.name().to_string(),
            position,
            island,
            settlement,
        },
        owner,
        components,
    );

    if ctx
        .world
        .component::<Producer>(building)
        .is_some_and(Producer::is_active)
    {
        ctx.scheduler
            .add_callback(Callback::ProducerTick { building }, 1, Some(1));
    }
    if let Some(interval) = ctx
        .world
        .component::<Settler>(building)
        .map(|settler| u64::from(settler.interval_ticks.max(1)))
    {
        ctx.scheduler.add_callback(
            Callback::SettlerTick { building },
            interval,
            Some(interval),
        );
    }
    if let Some(collecting) = &template.def.collecting {
        let defs = ctx.defs;
        match defs.template(&collecting.collector) {
            Some(worker) => {
                for _ in 0..collecting.count {
                    let collector = spawn_collector(ctx, worker, building, owner, island, position);
                    if let Some(component) = ctx.world.component_mut::<Collecting>(building) {
                        component.collectors.push(collector);
                    }
                }
            }
            None => warn!(
                worldid = building.0,
                collector = collecting.collector.as_str(),
                "collector_def_missing"
            ),
        }
    }

    info!(
        worldid = building.0,
        def = template.name(),
        x = position.x,
        y = position.y,
        "building_spawned"
    );
    building
}

fn spawn_collector(
    ctx: &mut SimContext<'_>,
    template: &ObjectTemplate,
    home: WorldId,
    owner: Option<WorldId>,
    island: WorldId,
    position: Point,
) -> WorldId {
    let components = template.instantiate(position).with(Collector {
        home,
        state: CollectorState::Idle,
        job: None,
        carried: None,
        work_ticks: template.def.work_ticks.unwrap_or(1),
    });
    let collector = ctx.world.spawn(
        ObjectKind::Unit {
            def: template.name().to_string(),
            position,
            island,
        },
        owner,
        components,
    );
    schedule_search(ctx, collector);
    collector
}

pub fn spawn_unit(
    ctx: &mut SimContext<'_>,
    template: &ObjectTemplate,
    owner: Option<WorldId>,
    island: WorldId,
    position: Point,
) -> WorldId {
    let mut components = template.instantiate(position);
    if let (Some(carries), Some(storage)) =
        (template.wildlife_carries, components.get_mut::<Storage>())
    {
        storage.inventory.add(carries.resource, carries.amount);
    }
    let wild = components.has::<Wildlife>();
    let unit = ctx.world.spawn(
        ObjectKind::Unit {
            def: template.name().to_string(),
            position,
            island,
        },
        owner,
        components,
    );
    if wild {
        ctx.scheduler
            .add_callback(Callback::AnimalTick { animal: unit }, 1, None);
    }
    info!(worldid = unit.0, def = template.name(), "unit_spawned");
    unit
}

/// Removes an object from the world along with everything that only exists because of it:
/// its callbacks, a building's collectors, a collector's reservation and listening animals.
pub fn destroy_object(
    ctx: &mut SimContext<'_>,
    id: WorldId,
) -> Result<WorldObject, RegistryError> {
    let object = ctx.world.despawn(id)?;
    let callbacks_removed = ctx
        .scheduler
        .remove_matching(|callback| callback.subject() == id);

    if let Some(collecting) = object.get::<Collecting>() {
        for collector in &collecting.collectors {
            if ctx.world.contains(*collector) {
                destroy_object(ctx, *collector)?;
            }
        }
    }
    if let Some(collector) = object.get::<Collector>() {
        if let Some(job) = collector.job {
            if let Some(storage) = ctx.world.component_mut::<Storage>(job.target) {
                storage.release(job.resource, job.amount);
            }
        }
        if let Some(collecting) = ctx.world.component_mut::<Collecting>(collector.home) {
            collecting.collectors.retain(|candidate| *candidate != id);
        }
    }
    if let Some(listener) = object
        .get::<Wildlife>()
        .and_then(|animal| animal.stop_listener)
    {
        ctx.scheduler.add_callback(
            Callback::TargetStopped {
                collector: listener,
                target: id,
            },
            1,
            None,
        );
    }
    let listening = ctx
        .world
        .objects()
        .filter(|candidate| {
            candidate
                .get::<Wildlife>()
                .is_some_and(|animal| animal.stop_listener == Some(id))
        })
        .map(|candidate| candidate.id)
        .collect::<Vec<_>>();
    for animal in listening {
        release_animal(ctx, animal);
    }

    info!(
        worldid = id.0,
        kind = object.kind.type_name(),
        callbacks_removed,
        "object_destroyed"
    );
    Ok(object)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::app::gameplay::components::{ComponentSet, ProductionLine};

    struct Fixture {
        world: World,
        scheduler: Scheduler<Callback>,
        defs: GameDefs,
        island: WorldId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut world = World::new();
            let island = world.spawn(
                ObjectKind::Island {
                    width: 32,
                    height: 32,
                    tiles: BTreeMap::new(),
                },
                None,
                ComponentSet::new(),
            );
            Self {
                world,
                scheduler: Scheduler::new(),
                defs: GameDefs::embedded().expect("embedded defs"),
                island,
            }
        }

        fn ctx(&mut self) -> SimContext<'_> {
            SimContext {
                world: &mut self.world,
                scheduler: &mut self.scheduler,
                defs: &self.defs,
            }
        }

        fn building(&mut self, def: &str, x: i32, y: i32) -> WorldId {
            let template = self.defs.template(def).expect("template").clone();
            let island = self.island;
            spawn_building(&mut self.ctx(), &template, None, island, None, Point::new(x, y))
        }

        fn unit(&mut self, def: &str, x: i32, y: i32) -> WorldId {
            let template = self.defs.template(def).expect("template").clone();
            let island = self.island;
            spawn_unit(&mut self.ctx(), &template, None, island, Point::new(x, y))
        }

        fn advance(&mut self, ticks: u64) {
            for _ in 0..ticks {
                run_tick(&mut self.ctx());
            }
        }

        fn producer_tick_count(&self, building: WorldId) -> usize {
            self.scheduler
                .entries()
                .filter(|entry| entry.callback == Callback::ProducerTick { building })
                .count()
        }
    }

    fn line(duration_ticks: u32) -> ProductionLine {
        ProductionLine {
            duration_ticks,
            inputs: vec![ResourceAmount {
                resource: ResourceId::Trees,
                amount: 1,
            }],
            outputs: vec![ResourceAmount {
                resource: ResourceId::Boards,
                amount: 1,
            }],
        }
    }

    #[test]
    fn production_waits_consumes_and_delivers() {
        let mut production = Production::new(line(2));
        let mut storage = Storage::new(2);

        advance_production(&mut production, &mut storage);
        assert_eq!(production.state, ProductionState::WaitingForResources);

        storage.inventory.add(ResourceId::Trees, 1);
        advance_production(&mut production, &mut storage);
        assert_eq!(production.state, ProductionState::Producing);
        assert_eq!(storage.inventory.amount(ResourceId::Trees), 0);

        advance_production(&mut production, &mut storage);
        assert_eq!(production.progress_ticks, 1);
        advance_production(&mut production, &mut storage);
        assert_eq!(production.state, ProductionState::None);
        assert_eq!(storage.inventory.amount(ResourceId::Boards), 1);
    }

    #[test]
    fn production_reports_full_inventory_and_ignores_reserved_inputs() {
        let mut production = Production::new(line(2));
        let mut storage = Storage::new(1);
        storage.inventory.add(ResourceId::Trees, 1);
        storage.inventory.add(ResourceId::Boards, 1);
        advance_production(&mut production, &mut storage);
        assert_eq!(production.state, ProductionState::InventoryFull);

        storage.inventory.remove(ResourceId::Boards, 1);
        assert!(storage.reserve(ResourceId::Trees, 1));
        advance_production(&mut production, &mut storage);
        assert_eq!(production.state, ProductionState::WaitingForResources);
    }

    #[test]
    fn set_active_keeps_exactly_one_tick_callback() {
        let mut fixture = Fixture::new();
        let tree = fixture.building("building.tree", 4, 4);
        fixture.advance(3);
        assert_eq!(fixture.producer_tick_count(tree), 1);

        set_active(&mut fixture.ctx(), tree, false).expect("pause");
        set_active(&mut fixture.ctx(), tree, false).expect("pause again");
        assert_eq!(fixture.producer_tick_count(tree), 0);
        let producer = fixture.world.component::<Producer>(tree).expect("producer");
        assert_eq!(producer.productions[0].state, ProductionState::Paused);
        assert_eq!(
            producer.productions[0].paused_from,
            Some(ProductionState::Producing)
        );
        let progress = producer.productions[0].progress_ticks;

        fixture.advance(5);
        set_active(&mut fixture.ctx(), tree, true).expect("resume");
        set_active(&mut fixture.ctx(), tree, true).expect("resume again");
        assert_eq!(fixture.producer_tick_count(tree), 1);
        let producer = fixture.world.component::<Producer>(tree).expect("producer");
        assert_eq!(producer.productions[0].state, ProductionState::Producing);
        assert_eq!(producer.productions[0].progress_ticks, progress);
    }

    #[test]
    fn collector_targets_nearest_provider_with_lowest_id_on_ties() {
        let mut fixture = Fixture::new();
        let far = fixture.building("building.tree", 10, 14);
        let near_b = fixture.building("building.tree", 12, 10);
        let near_a = fixture.building("building.tree", 8, 10);
        let lumberjack = fixture.building("building.lumberjack", 10, 10);
        for tree in [far, near_b, near_a] {
            fixture
                .world
                .component_mut::<Storage>(tree)
                .expect("storage")
                .inventory
                .add(ResourceId::Trees, 1);
        }

        let job = find_collect_target(&fixture.world, lumberjack).expect("job");
        assert_eq!(job.target, near_b);
        assert_eq!(job.resource, ResourceId::Trees);

        fixture
            .world
            .component_mut::<Storage>(near_b)
            .expect("storage")
            .reserve(ResourceId::Trees, 1);
        let job = find_collect_target(&fixture.world, lumberjack).expect("job");
        assert_eq!(job.target, near_a);
    }

    #[test]
    fn lumberjack_collects_and_starts_producing() {
        let mut fixture = Fixture::new();
        fixture.building("building.tree", 9, 9);
        let lumberjack = fixture.building("building.lumberjack", 10, 10);

        let mut producing_at = None;
        for tick in 1..=400 {
            fixture.advance(1);
            let producer = fixture
                .world
                .component::<Producer>(lumberjack)
                .expect("producer");
            if producer.productions[0].state == ProductionState::Producing {
                producing_at = Some(tick);
                break;
            }
        }
        assert!(producing_at.is_some(), "lumberjack never started producing");
    }

    #[test]
    fn destroying_building_removes_collectors_and_callbacks() {
        let mut fixture = Fixture::new();
        let hunter = fixture.building("building.hunter", 10, 10);
        let collectors = fixture
            .world
            .component::<Collecting>(hunter)
            .expect("collecting")
            .collectors
            .clone();
        assert_eq!(collectors.len(), 1);

        destroy_object(&mut fixture.ctx(), hunter).expect("destroy");
        assert!(!fixture.world.contains(hunter));
        assert!(!fixture.world.contains(collectors[0]));
        assert!(fixture
            .scheduler
            .entries()
            .all(|entry| entry.callback.subject() != hunter
                && entry.callback.subject() != collectors[0]));
    }

    #[test]
    fn collector_without_a_home_is_removed_instead_of_walking() {
        let mut fixture = Fixture::new();
        let hunter = fixture.building("building.hunter", 10, 10);
        let collector = fixture
            .world
            .component::<Collecting>(hunter)
            .and_then(|collecting| collecting.collectors.first().copied())
            .expect("collector");
        fixture.world.despawn(hunter).expect("despawn home");

        go_home(&mut fixture.ctx(), collector);
        assert!(!fixture.world.contains(collector));
        assert!(fixture
            .scheduler
            .entries()
            .all(|entry| entry.callback.subject() != collector));

        go_home(&mut fixture.ctx(), collector);
        assert!(!fixture.world.contains(collector));
    }

    #[test]
    fn standing_animal_halts_and_signals_next_tick() {
        let mut fixture = Fixture::new();
        let animal = fixture.unit("unit.wild_animal", 5, 5);
        fixture
            .scheduler
            .remove_matching(|callback| *callback == Callback::AnimalTick { animal });
        let listener = WorldId(999);

        request_stop(&mut fixture.ctx(), animal, listener);
        let wildlife = fixture.world.component::<Wildlife>(animal).expect("wildlife");
        assert!(wildlife.halted);
        let entries = fixture.scheduler.entries().collect::<Vec<_>>();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].callback,
            Callback::TargetStopped {
                collector: listener,
                target: animal
            }
        );
        assert_eq!(entries[0].tick, fixture.scheduler.cur_tick() + 1);
    }

    #[test]
    fn walking_animal_halts_after_its_current_step() {
        let mut fixture = Fixture::new();
        let animal = fixture.unit("unit.wild_animal", 5, 5);
        fixture.advance(1);
        assert!(fixture
            .world
            .component::<Walker>(animal)
            .expect("walker")
            .is_moving());

        request_stop(&mut fixture.ctx(), animal, WorldId(999));
        assert!(!fixture.world.component::<Wildlife>(animal).expect("wildlife").halted);
        fixture.advance(3);
        let wildlife = fixture.world.component::<Wildlife>(animal).expect("wildlife");
        assert!(wildlife.halted);
        assert!(!fixture
            .world
            .component::<Walker>(animal)
            .expect("walker")
            .is_moving());
        assert_eq!(fixture.world.position_of(animal), Some(Point::new(6, 5)));
    }
}
