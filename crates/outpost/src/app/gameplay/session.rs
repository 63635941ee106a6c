use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::path::{Path, PathBuf};

use engine::{
    seconds_to_ticks, Camera2D, Layer, PointerButton, PointerEvent, RegistryError, Scheduler,
    Sprite, SpriteViewport, Viewport, ViewportHandle, WorldId, DEFAULT_TICKS_PER_SECOND,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::commands::{Command, CommandError, CommandOutcome};
use super::components::{ComponentSet, Storage};
use super::defs::{DefsError, GameDefs};
use super::save::{self, RestoredGame};
use super::selection::{self, SelectionTool, ToolContext};
use super::systems::{self, Callback, SimContext};
use super::types::{Hud, Lifecycle, Point, ResourceAmount, RunLength, ToolKind};
use super::world::{ObjectKind, World};

pub const CONTENT_DIR_ENV_VAR: &str = "OUTPOST_CONTENT_DIR";
const ISLAND_SPRITE_HALF_SIZE_PX: i32 = 4096;
const OBJECT_SPRITE_HALF_SIZE_PX: i32 = 14;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub ticks_per_second: u32,
    pub island_width: i32,
    pub island_height: i32,
    pub local_player_name: String,
    /// Compile defs from this directory instead of the embedded `assets/base/defs.xml`.
    pub content_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ticks_per_second: DEFAULT_TICKS_PER_SECOND,
            island_width: 64,
            island_height: 64,
            local_player_name: "Player".to_string(),
            content_dir: None,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        let content_dir = env::var(CONTENT_DIR_ENV_VAR)
            .ok()
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from);
        Self {
            content_dir,
            ..Self::default()
        }
    }

    fn load_defs(&self) -> Result<GameDefs, DefsError> {
        match &self.content_dir {
            Some(dir) => GameDefs::from_dir(dir),
            None => GameDefs::embedded(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Defs(#[from] DefsError),
    #[error("save failed: {0}")]
    Save(String),
    #[error("load failed: {0}")]
    Load(String),
    #[error("session has ended")]
    Ended,
}

/// One running game: world, scheduler and the input-facing state around them.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    defs: GameDefs,
    world: World,
    scheduler: Scheduler<Callback>,
    selection: Option<BTreeSet<WorldId>>,
    tool: ToolKind,
    selection_tool: SelectionTool,
    hud: Hud,
    camera: Camera2D,
    lifecycle: Lifecycle,
    local_player: WorldId,
    main_island: WorldId,
}

pub fn new_session() -> Result<Session, SessionError> {
    new_session_with(SessionConfig::from_env())
}

/// Fresh game with the local player and one empty island.
pub fn new_session_with(config: SessionConfig) -> Result<Session, SessionError> {
    let defs = config.load_defs()?;
    let mut world = World::new();
    let local_player = world.spawn(
        ObjectKind::Player {
            name: config.local_player_name.clone(),
            is_local_player: true,
        },
        None,
        ComponentSet::new(),
    );
    let main_island = world.spawn(
        ObjectKind::Island {
            width: config.island_width,
            height: config.island_height,
            tiles: BTreeMap::new(),
        },
        None,
        ComponentSet::new(),
    );
    let camera = Camera2D {
        position: Point::new(config.island_width / 2, config.island_height / 2).to_world(),
        ..Camera2D::default()
    };
    info!(
        local_player = local_player.0,
        island = main_island.0,
        content_hash = defs.content_hash(),
        "session_started"
    );
    Ok(Session::assemble(
        config,
        defs,
        world,
        Scheduler::new(),
        camera,
        local_player,
        main_island,
    ))
}

pub fn load_session(path: &Path) -> Result<Session, SessionError> {
    load_session_with(path, SessionConfig::from_env())
}

/// Builds a new session from a save file. The caller's current session, if any, is untouched.
pub fn load_session_with(path: &Path, config: SessionConfig) -> Result<Session, SessionError> {
    let defs = config.load_defs()?;
    let save = save::read_save_game(path).map_err(SessionError::Load)?;
    let RestoredGame {
        world,
        scheduler,
        camera,
        local_player,
        main_island,
    } = save::restore_save_game(save, &defs).map_err(SessionError::Load)?;
    info!(
        path = %path.display(),
        tick = scheduler.cur_tick(),
        objects = world.len(),
        "session_loaded"
    );
    Ok(Session::assemble(
        config,
        defs,
        world,
        scheduler,
        camera,
        local_player,
        main_island,
    ))
}

impl Session {
    fn assemble(
        config: SessionConfig,
        defs: GameDefs,
        world: World,
        scheduler: Scheduler<Callback>,
        camera: Camera2D,
        local_player: WorldId,
        main_island: WorldId,
    ) -> Self {
        Self {
            config,
            defs,
            world,
            scheduler,
            selection: Some(BTreeSet::new()),
            tool: ToolKind::Default,
            selection_tool: SelectionTool::new(),
            hud: Hud::default(),
            camera,
            lifecycle: Lifecycle::Running,
            local_player,
            main_island,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn defs(&self) -> &GameDefs {
        &self.defs
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn scheduler(&self) -> &Scheduler<Callback> {
        &self.scheduler
    }

    pub fn cur_tick(&self) -> u64 {
        self.scheduler.cur_tick()
    }

    /// `None` once the session has ended.
    pub fn selection(&self) -> Option<&BTreeSet<WorldId>> {
        self.selection.as_ref()
    }

    pub fn tool(&self) -> ToolKind {
        self.tool
    }

    pub fn hud(&self) -> &Hud {
        &self.hud
    }

    pub fn camera(&self) -> &Camera2D {
        &self.camera
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }

    pub fn local_player(&self) -> WorldId {
        self.local_player
    }

    pub fn main_island(&self) -> WorldId {
        self.main_island
    }

    pub(crate) fn sim_parts(&mut self) -> (&GameDefs, SimContext<'_>) {
        (
            &self.defs,
            SimContext {
                world: &mut self.world,
                scheduler: &mut self.scheduler,
                defs: &self.defs,
            },
        )
    }

    pub fn execute(&mut self, command: Command) -> Result<CommandOutcome, CommandError> {
        command.execute(self)
    }

    /// Runs the late-init hook if a load left it pending. `run` calls this on its own.
    pub fn before_ticking(&mut self) {
        if !self.scheduler.take_late_init_pending() {
            return;
        }
        let (_, mut ctx) = self.sim_parts();
        systems::before_ticking(&mut ctx);
    }

    /// Advances the simulation and returns the number of ticks run.
    pub fn run(&mut self, length: RunLength) -> Result<u64, SessionError> {
        if !self.is_running() {
            return Err(SessionError::Ended);
        }
        let ticks = match length {
            RunLength::Ticks(ticks) => ticks,
            RunLength::Seconds(seconds) => seconds_to_ticks(seconds, self.config.ticks_per_second),
        };
        self.before_ticking();
        for _ in 0..ticks {
            let (_, mut ctx) = self.sim_parts();
            systems::run_tick(&mut ctx);
            self.prune_selection();
        }
        debug!(ticks, tick = self.scheduler.cur_tick(), "session_ran");
        Ok(ticks)
    }

    fn prune_selection(&mut self) {
        let Some(selection) = self.selection.as_mut() else {
            return;
        };
        let world = &self.world;
        selection.retain(|id| world.contains(*id));
    }

    /// Writes the session to `path`. The world is only read, so a failed save changes nothing.
    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        if !self.is_running() {
            return Err(SessionError::Ended);
        }
        let save = save::build_save_game(
            &self.world,
            &self.scheduler,
            &self.camera,
            self.local_player,
            self.main_island,
            self.defs.content_hash(),
        );
        save::write_save_game(path, &save).map_err(SessionError::Save)?;
        info!(
            path = %path.display(),
            tick = save.tick,
            objects = save.objects.len(),
            "session_saved"
        );
        Ok(())
    }

    /// Stops the session. With `keep_map` the world stays readable, otherwise it is dropped.
    pub fn end(&mut self, keep_map: bool) {
        selection::deselect_all(&mut self.world, &mut self.selection);
        self.selection = None;
        self.hud = Hud::default();
        self.scheduler.clear();
        if !keep_map {
            self.world.clear();
        }
        self.lifecycle = Lifecycle::Ended;
        info!(keep_map, "session_ended");
    }

    /// Feeds one pointer event to the active tool, then executes any move orders it produced.
    pub fn handle_pointer(&mut self, event: &PointerEvent, viewport: &dyn Viewport) {
        if !self.tool.is_selection_based() && event.button() != PointerButton::Middle {
            return;
        }
        let mut pending_acts = Vec::new();
        let mut ctx = ToolContext {
            world: &mut self.world,
            selection: &mut self.selection,
            hud: &mut self.hud,
            camera: &mut self.camera,
            tool: &mut self.tool,
            viewport,
            pending_acts: &mut pending_acts,
        };
        self.selection_tool.handle(&mut ctx, event);

        for (unit, target) in pending_acts {
            let command = Command::Act {
                issuer: self.local_player,
                unit,
                x: target.x,
                y: target.y,
            };
            if let Err(error) = command.execute(self) {
                debug!(unit = unit.0, error = %error, "act_rejected");
            }
        }
    }

    /// Switches the active tool. Leaving the selection tools clears the selection unless the last
    /// selection handed the cursor to the attacking tool.
    pub fn set_cursor(&mut self, tool: ToolKind) {
        if self.tool == tool {
            return;
        }
        if self.tool.is_selection_based()
            && !tool.is_selection_based()
            && self.selection_tool.deselect_at_end()
        {
            selection::deselect_all(&mut self.world, &mut self.selection);
        }
        info!(from = ?self.tool, to = ?tool, "cursor_changed");
        self.tool = tool;
    }

    pub fn toggle_health_bars(&mut self) {
        self.hud.health_bars_visible = !self.hud.health_bars_visible;
    }

    /// Registers a non-local player, e.g. an opponent owning foreign units.
    pub fn add_player(&mut self, name: &str) -> WorldId {
        self.world.spawn(
            ObjectKind::Player {
                name: name.to_string(),
                is_local_player: false,
            },
            None,
            ComponentSet::new(),
        )
    }

    /// Puts resources straight into an object's storage and returns how much fit.
    pub fn add_to_storage(
        &mut self,
        id: WorldId,
        amount: ResourceAmount,
    ) -> Result<u32, RegistryError> {
        let object = self.world.get_mut(id)?;
        let Some(storage) = object.get_mut::<Storage>() else {
            warn!(worldid = id.0, "add_to_storage_without_storage");
            return Ok(0);
        };
        Ok(storage.inventory.add(amount.resource, amount.amount))
    }

    /// Sprites for every object: the island on the ground layer, then buildings, then units on
    /// top. Instance ids are worldids.
    pub fn scene_viewport(&self, window_size: (u32, u32)) -> SpriteViewport {
        let mut viewport = SpriteViewport::new(self.camera, window_size);
        if let Some((width, height)) = self.world.island_size(self.main_island) {
            viewport.push(Sprite {
                handle: ViewportHandle::new(""),
                layer: Layer::Ground,
                center_world: Point::new(width / 2, height / 2).to_world(),
                half_size_px: ISLAND_SPRITE_HALF_SIZE_PX,
            });
        }
        let buildings = self.world.objects().filter(|object| object.is_building());
        let units = self.world.objects().filter(|object| object.is_unit());
        for object in buildings.chain(units) {
            let Some(position) = object.position() else {
                continue;
            };
            viewport.push(Sprite {
                handle: ViewportHandle::new(object.id.to_string()),
                layer: Layer::Objects,
                center_world: position.to_world(),
                half_size_px: OBJECT_SPRITE_HALF_SIZE_PX,
            });
        }
        viewport
    }
}
