use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectDefId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectClass {
    Building,
    Unit,
}

/// `resource:amount` pair as written in defs, e.g. `trees:1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceAmountDef {
    pub resource: String,
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductionLineDef {
    pub duration_ticks: u32,
    pub inputs: Vec<ResourceAmountDef>,
    pub outputs: Vec<ResourceAmountDef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectingDef {
    pub collector: String,
    pub count: u32,
    pub radius: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlerDef {
    pub interval_ticks: u32,
    pub consumes: ResourceAmountDef,
    pub ruin: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildlifeDef {
    pub carries: ResourceAmountDef,
    pub graze_ticks: u32,
}

#[derive(Debug, Clone)]
pub struct ObjectDef {
    pub id: ObjectDefId,
    pub def_name: String,
    pub label: String,
    pub class: ObjectClass,
    pub selectable: bool,
    pub step_ticks: Option<u32>,
    pub storage_limit: Option<u32>,
    pub production: Option<ProductionLineDef>,
    pub collecting: Option<CollectingDef>,
    pub work_ticks: Option<u32>,
    pub weapon_damage: Option<u32>,
    pub settler: Option<SettlerDef>,
    pub wildlife: Option<WildlifeDef>,
    pub tags: Vec<String>,
}

impl ObjectDef {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|candidate| candidate == tag)
    }
}

#[derive(Debug, Default, Clone)]
pub struct DefDatabase {
    object_defs: Vec<ObjectDef>,
    object_ids_by_name: HashMap<String, ObjectDefId>,
    content_hash: String,
}

impl DefDatabase {
    pub(crate) fn from_object_defs(mut object_defs: Vec<ObjectDef>, content_hash: String) -> Self {
        let mut object_ids_by_name = HashMap::with_capacity(object_defs.len());
        for (idx, def) in object_defs.iter_mut().enumerate() {
            let id = ObjectDefId(idx as u32);
            def.id = id;
            object_ids_by_name.insert(def.def_name.clone(), id);
        }
        Self {
            object_defs,
            object_ids_by_name,
            content_hash,
        }
    }

    pub fn object_def_id_by_name(&self, name: &str) -> Option<ObjectDefId> {
        self.object_ids_by_name.get(name).copied()
    }

    pub fn object_def(&self, id: ObjectDefId) -> Option<&ObjectDef> {
        self.object_defs.get(id.0 as usize)
    }

    pub fn object_def_by_name(&self, name: &str) -> Option<&ObjectDef> {
        self.object_def_id_by_name(name)
            .and_then(|id| self.object_def(id))
    }

    pub fn object_defs(&self) -> &[ObjectDef] {
        &self.object_defs
    }

    /// Lowercase hex sha256 over every compiled source.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }
}
