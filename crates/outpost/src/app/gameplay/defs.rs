use std::collections::BTreeMap;
use std::path::Path;

use engine::{
    compile_def_database_from_dir, compile_def_database_from_str, ContentCompileError,
    DefDatabase, ObjectClass, ObjectDef, ResourceAmountDef,
};
use thiserror::Error;
use tracing::info;

use super::components::{
    Collecting, ComponentSet, Producer, Production, ProductionLine, Selectable, Settler, Storage,
    Walker, Weapon, Wildlife,
};
use super::types::{Point, ResourceAmount, ResourceId};

pub const SUPPLIES_SETTLERS_TAG: &str = "supplies_settlers";
const EMBEDDED_DEFS_SOURCE: &str = "assets/base/defs.xml";
const EMBEDDED_DEFS: &str = include_str!("../../../../../assets/base/defs.xml");

#[derive(Debug, Error)]
pub enum DefsError {
    #[error(transparent)]
    Content(#[from] ContentCompileError),
    #[error("def '{def}' references unknown resource '{resource}'")]
    UnknownResource { def: String, resource: String },
}

/// A compiled def with its resources resolved to [`ResourceId`]s.
#[derive(Debug, Clone)]
pub struct ObjectTemplate {
    pub def: ObjectDef,
    pub production: Option<ProductionLine>,
    pub settler_consumes: Option<ResourceAmount>,
    pub wildlife_carries: Option<ResourceAmount>,
}

impl ObjectTemplate {
    pub fn name(&self) -> &str {
        &self.def.def_name
    }

    pub fn class(&self) -> ObjectClass {
        self.def.class
    }

    /// Fresh components for a newly spawned instance placed at `position`.
    ///
    /// Collectors and wildlife stock are wired up by the spawn systems, not here.
    pub fn instantiate(&self, position: Point) -> ComponentSet {
        let mut components = ComponentSet::new();
        if self.def.selectable {
            components.insert(Selectable::default());
        }
        if let Some(limit) = self.def.storage_limit {
            components.insert(Storage::new(limit));
        }
        if let Some(line) = &self.production {
            components.insert(Producer {
                productions: vec![Production::new(line.clone())],
                active: true,
            });
        }
        if let Some(collecting) = &self.def.collecting {
            components.insert(Collecting {
                collectors: Vec::new(),
                radius: collecting.radius,
            });
        }
        if let Some(step_ticks) = self.def.step_ticks {
            components.insert(Walker::new(step_ticks));
        }
        if let Some(wildlife) = &self.def.wildlife {
            components.insert(Wildlife {
                home: position,
                graze_ticks: wildlife.graze_ticks,
                stop_listener: None,
                halted: false,
                wander_step: 0,
            });
        }
        if let (Some(settler), Some(consumes)) = (&self.def.settler, self.settler_consumes) {
            components.insert(Settler {
                interval_ticks: settler.interval_ticks,
                consumes,
                ruin: settler.ruin.clone(),
                unsupplied: 0,
            });
        }
        if let Some(damage) = self.def.weapon_damage {
            components.insert(Weapon { damage });
        }
        components
    }
}

#[derive(Debug, Clone)]
pub struct GameDefs {
    database: DefDatabase,
    templates: BTreeMap<String, ObjectTemplate>,
}

impl GameDefs {
    /// Defs compiled into the binary from `assets/base/defs.xml`.
    pub fn embedded() -> Result<Self, DefsError> {
        let database = compile_def_database_from_str(EMBEDDED_DEFS_SOURCE, EMBEDDED_DEFS)?;
        Self::from_database(database)
    }

    pub fn from_dir(dir: &Path) -> Result<Self, DefsError> {
        let database = compile_def_database_from_dir(dir)?;
        Self::from_database(database)
    }

    pub fn from_database(database: DefDatabase) -> Result<Self, DefsError> {
        let mut templates = BTreeMap::new();
        for def in database.object_defs() {
            let template = resolve_template(def)?;
            templates.insert(def.def_name.clone(), template);
        }
        info!(
            def_count = templates.len(),
            content_hash = database.content_hash(),
            "game_defs_ready"
        );
        Ok(Self {
            database,
            templates,
        })
    }

    pub fn template(&self, def_name: &str) -> Option<&ObjectTemplate> {
        self.templates.get(def_name)
    }

    pub fn templates(&self) -> impl Iterator<Item = &ObjectTemplate> {
        self.templates.values()
    }

    pub fn content_hash(&self) -> &str {
        self.database.content_hash()
    }

    pub fn database(&self) -> &DefDatabase {
        &self.database
    }
}

fn resolve_template(def: &ObjectDef) -> Result<ObjectTemplate, DefsError> {
    let production = match &def.production {
        Some(line) => Some(ProductionLine {
            duration_ticks: line.duration_ticks,
            inputs: resolve_amounts(def, &line.inputs)?,
            outputs: resolve_amounts(def, &line.outputs)?,
        }),
        None => None,
    };
    let settler_consumes = match &def.settler {
        Some(settler) => Some(resolve_amount(def, &settler.consumes)?),
        None => None,
    };
    let wildlife_carries = match &def.wildlife {
        Some(wildlife) => Some(resolve_amount(def, &wildlife.carries)?),
        None => None,
    };
    Ok(ObjectTemplate {
        def: def.clone(),
        production,
        settler_consumes,
        wildlife_carries,
    })
}

fn resolve_amounts(
    def: &ObjectDef,
    amounts: &[ResourceAmountDef],
) -> Result<Vec<ResourceAmount>, DefsError> {
    amounts
        .iter()
        .map(|amount| resolve_amount(def, amount))
        .collect()
}

fn resolve_amount(def: &ObjectDef, amount: &ResourceAmountDef) -> Result<ResourceAmount, DefsError> {
    let resource =
        ResourceId::from_name(&amount.resource).ok_or_else(|| DefsError::UnknownResource {
            def: def.def_name.clone(),
            resource: amount.resource.clone(),
        })?;
    Ok(ResourceAmount {
        resource,
        amount: amount.amount,
    })
}
