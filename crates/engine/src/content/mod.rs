mod atomic_io;
mod compiler;
mod database;
mod hashing;

pub use atomic_io::write_text_atomic;
pub use compiler::{
    compile_def_database_from_dir, compile_def_database_from_str, ContentCompileError,
    ContentErrorCode, SourceLocation,
};
pub use database::{
    CollectingDef, DefDatabase, ObjectClass, ObjectDef, ObjectDefId, ProductionLineDef,
    ResourceAmountDef, SettlerDef, WildlifeDef,
};
