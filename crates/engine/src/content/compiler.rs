use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use tracing::info;

use super::database::{
    CollectingDef, DefDatabase, ObjectClass, ObjectDef, ObjectDefId, ProductionLineDef,
    ResourceAmountDef, SettlerDef, WildlifeDef,
};
use super::hashing::hash_named_sources;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentErrorCode {
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownDefType,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateDef,
    UnknownReference,
}

#[derive(Debug, Clone)]
pub struct ContentCompileError {
    pub code: ContentErrorCode,
    pub message: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for ContentCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for ContentCompileError {}

const OBJECT_DEF_FIELDS: &[&str] = &[
    "defName",
    "label",
    "class",
    "selectable",
    "stepTicks",
    "storageLimit",
    "production",
    "collecting",
    "workTicks",
    "weaponDamage",
    "settler",
    "wildlife",
    "tags",
];

/// Compiles a single in-memory defs document; `source_name` stands in for a file path in errors.
pub fn compile_def_database_from_str(
    source_name: &str,
    raw: &str,
) -> Result<DefDatabase, ContentCompileError> {
    compile_sources(vec![SourceFile {
        rel_name: source_name.to_string(),
        path: PathBuf::from(source_name),
        raw: raw.to_string(),
    }])
}

/// Compiles every `*.xml` under `dir`, visited in normalized relative path order.
pub fn compile_def_database_from_dir(dir: &Path) -> Result<DefDatabase, ContentCompileError> {
    let xml_files =
        collect_xml_files_sorted(dir).map_err(|error| read_error(error.path, error.source))?;
    let mut sources = Vec::with_capacity(xml_files.len());
    for (rel_name, path) in xml_files {
        let raw = fs::read_to_string(&path).map_err(|source| read_error(path.clone(), source))?;
        sources.push(SourceFile {
            rel_name,
            path,
            raw,
        });
    }
    let source_count = sources.len();
    let database = compile_sources(sources)?;
    info!(
        dir = %dir.display(),
        source_count,
        def_count = database.object_defs().len(),
        content_hash = database.content_hash(),
        "content_compiled"
    );
    Ok(database)
}

struct SourceFile {
    rel_name: String,
    path: PathBuf,
    raw: String,
}

fn compile_sources(sources: Vec<SourceFile>) -> Result<DefDatabase, ContentCompileError> {
    let content_hash = hash_named_sources(
        sources
            .iter()
            .map(|source| (source.rel_name.as_str(), source.raw.as_bytes())),
    );

    let mut merged = BTreeMap::<String, (ObjectDef, PathBuf)>::new();
    for source in &sources {
        for def in parse_defs_document(&source.path, &source.raw)? {
            if merged.contains_key(&def.def_name) {
                return Err(ContentCompileError {
                    code: ContentErrorCode::DuplicateDef,
                    message: format!(
                        "duplicate ObjectDef '{}'; each defName may be defined only once",
                        def.def_name
                    ),
                    file_path: source.path.clone(),
                    location: None,
                });
            }
            merged.insert(def.def_name.clone(), (def, source.path.clone()));
        }
    }

    for (def, path) in merged.values() {
        validate_references(def, path, &merged)?;
    }

    let object_defs = merged.into_values().map(|(def, _)| def).collect::<Vec<_>>();
    Ok(DefDatabase::from_object_defs(object_defs, content_hash))
}

fn validate_references(
    def: &ObjectDef,
    path: &Path,
    merged: &BTreeMap<String, (ObjectDef, PathBuf)>,
) -> Result<(), ContentCompileError> {
    let expect_class = |field: &str, target: &str, class: ObjectClass| {
        match merged.get(target) {
            Some((target_def, _)) if target_def.class == class => Ok(()),
            _ => Err(ContentCompileError {
                code: ContentErrorCode::UnknownReference,
                message: format!(
                    "<{}> of '{}' references '{}', which is not a {:?} def",
                    field, def.def_name, target, class
                ),
                file_path: path.to_path_buf(),
                location: None,
            }),
        }
    };
    if let Some(collecting) = &def.collecting {
        expect_class("collector", &collecting.collector, ObjectClass::Unit)?;
    }
    if let Some(settler) = &def.settler {
        expect_class("ruin", &settler.ruin, ObjectClass::Building)?;
    }
    Ok(())
}

struct ParseContext<'d, 'input> {
    file_path: &'d Path,
    doc: &'d Document<'input>,
}

impl ParseContext<'_, '_> {
    fn error(&self, code: ContentErrorCode, message: String, node: Node<'_, '_>) -> ContentCompileError {
        let pos = self.doc.text_pos_at(node.range().start);
        ContentCompileError {
            code,
            message,
            file_path: self.file_path.to_path_buf(),
            location: Some(SourceLocation {
                line: pos.row as usize,
                column: pos.col as usize,
            }),
        }
    }
}

fn parse_defs_document(file_path: &Path, raw: &str) -> Result<Vec<ObjectDef>, ContentCompileError> {
    let doc = Document::parse(raw).map_err(|error| ContentCompileError {
        code: ContentErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;
    let ctx = ParseContext {
        file_path,
        doc: &doc,
    };

    let root = doc.root_element();
    if root.tag_name().name() != "Defs" {
        return Err(ctx.error(
            ContentErrorCode::InvalidRoot,
            "root element must be <Defs>".to_string(),
            root,
        ));
    }

    let mut defs = Vec::<ObjectDef>::new();
    for child in root.children().filter(|node| node.is_element()) {
        if child.tag_name().name() != "ObjectDef" {
            return Err(ctx.error(
                ContentErrorCode::UnknownDefType,
                format!(
                    "unsupported def type <{}>; only <ObjectDef> is supported",
                    child.tag_name().name()
                ),
                child,
            ));
        }
        defs.push(parse_object_def(&ctx, child)?);
    }
    Ok(defs)
}

fn parse_object_def(
    ctx: &ParseContext<'_, '_>,
    node: Node<'_, '_>,
) -> Result<ObjectDef, ContentCompileError> {
    let fields = collect_fields(ctx, node, "ObjectDef", OBJECT_DEF_FIELDS)?;

    let def_name = required_text(ctx, required_field(ctx, &fields, node, "ObjectDef", "defName")?, "defName")?;
    let label = required_text(ctx, required_field(ctx, &fields, node, "ObjectDef", "label")?, "label")?;
    let class_node = required_field(ctx, &fields, node, "ObjectDef", "class")?;
    let class = match required_text(ctx, class_node, "class")?.as_str() {
        "Building" => ObjectClass::Building,
        "Unit" => ObjectClass::Unit,
        other => {
            return Err(ctx.error(
                ContentErrorCode::InvalidValue,
                format!("invalid class '{}'; allowed values: Building, Unit", other),
                class_node,
            ))
        }
    };

    let selectable = match fields.get("selectable") {
        Some(field) => parse_bool(ctx, *field, "selectable")?,
        None => false,
    };
    let optional_u32 = |name: &str, min: u32| -> Result<Option<u32>, ContentCompileError> {
        fields
            .get(name)
            .map(|field| parse_u32(ctx, *field, name, min))
            .transpose()
    };
    let step_ticks = optional_u32("stepTicks", 1)?;
    let storage_limit = optional_u32("storageLimit", 1)?;
    let work_ticks = optional_u32("workTicks", 1)?;
    let weapon_damage = optional_u32("weaponDamage", 0)?;

    let production = fields
        .get("production")
        .map(|field| parse_production(ctx, *field))
        .transpose()?;
    let collecting = fields
        .get("collecting")
        .map(|field| parse_collecting(ctx, *field))
        .transpose()?;
    let settler = fields
        .get("settler")
        .map(|field| parse_settler(ctx, *field))
        .transpose()?;
    let wildlife = fields
        .get("wildlife")
        .map(|field| parse_wildlife(ctx, *field))
        .transpose()?;
    let tags = match fields.get("tags") {
        Some(field) => list_items(ctx, *field, "tags")?
            .into_iter()
            .map(|item| required_text(ctx, item, "li"))
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    if production.is_some() && storage_limit.is_none() {
        return Err(ctx.error(
            ContentErrorCode::MissingField,
            format!("ObjectDef '{}' has <production> but no <storageLimit>", def_name),
            node,
        ));
    }
    if collecting.is_some() && production.is_none() {
        return Err(ctx.error(
            ContentErrorCode::MissingField,
            format!("ObjectDef '{}' has <collecting> but no <production>", def_name),
            node,
        ));
    }

    Ok(ObjectDef {
        id: ObjectDefId(0),
        def_name,
        label,
        class,
        selectable,
        step_ticks,
        storage_limit,
        production,
        collecting,
        work_ticks,
        weapon_damage,
        settler,
        wildlife,
        tags,
    })
}

fn parse_production(
    ctx: &ParseContext<'_, '_>,
    node: Node<'_, '_>,
) -> Result<ProductionLineDef, ContentCompileError> {
    let fields = collect_fields(ctx, node, "production", &["durationTicks", "input", "output"])?;
    let duration_ticks = parse_u32(
        ctx,
        required_field(ctx, &fields, node, "production", "durationTicks")?,
        "durationTicks",
        1,
    )?;
    let inputs = match fields.get("input") {
        Some(field) => parse_resource_list(ctx, *field, "input")?,
        None => Vec::new(),
    };
    let output_node = required_field(ctx, &fields, node, "production", "output")?;
    let outputs = parse_resource_list(ctx, output_node, "output")?;
    if outputs.is_empty() {
        return Err(ctx.error(
            ContentErrorCode::MissingField,
            "<output> must list at least one resource".to_string(),
            output_node,
        ));
    }
    Ok(ProductionLineDef {
        duration_ticks,
        inputs,
        outputs,
    })
}

fn parse_collecting(
    ctx: &ParseContext<'_, '_>,
    node: Node<'_, '_>,
) -> Result<CollectingDef, ContentCompileError> {
    let fields = collect_fields(ctx, node, "collecting", &["collector", "count", "radius"])?;
    let collector = required_text(
        ctx,
        required_field(ctx, &fields, node, "collecting", "collector")?,
        "collector",
    )?;
    let count = match fields.get("count") {
        Some(field) => parse_u32(ctx, *field, "count", 1)?,
        None => 1,
    };
    let radius = parse_u32(
        ctx,
        required_field(ctx, &fields, node, "collecting", "radius")?,
        "radius",
        1,
    )?;
    Ok(CollectingDef {
        collector,
        count,
        radius,
    })
}

fn parse_settler(
    ctx: &ParseContext<'_, '_>,
    node: Node<'_, '_>,
) -> Result<SettlerDef, ContentCompileError> {
    let fields = collect_fields(ctx, node, "settler", &["intervalTicks", "consumes", "ruin"])?;
    let interval_ticks = parse_u32(
        ctx,
        required_field(ctx, &fields, node, "settler", "intervalTicks")?,
        "intervalTicks",
        1,
    )?;
    let consumes = parse_resource_amount(
        ctx,
        required_field(ctx, &fields, node, "settler", "consumes")?,
        "consumes",
    )?;
    let ruin = required_text(ctx, required_field(ctx, &fields, node, "settler", "ruin")?, "ruin")?;
    Ok(SettlerDef {
        interval_ticks,
        consumes,
        ruin,
    })
}

fn parse_wildlife(
    ctx: &ParseContext<'_, '_>,
    node: Node<'_, '_>,
) -> Result<WildlifeDef, ContentCompileError> {
    let fields = collect_fields(ctx, node, "wildlife", &["carries", "grazeTicks"])?;
    let carries = parse_resource_amount(
        ctx,
        required_field(ctx, &fields, node, "wildlife", "carries")?,
        "carries",
    )?;
    let graze_ticks = parse_u32(
        ctx,
        required_field(ctx, &fields, node, "wildlife", "grazeTicks")?,
        "grazeTicks",
        1,
    )?;
    Ok(WildlifeDef {
        carries,
        graze_ticks,
    })
}

fn collect_fields<'a, 'input>(
    ctx: &ParseContext<'_, '_>,
    node: Node<'a, 'input>,
    owner: &str,
    allowed: &[&str],
) -> Result<HashMap<String, Node<'a, 'input>>, ContentCompileError> {
    let mut fields = HashMap::<String, Node<'a, 'input>>::new();
    for field in node.children().filter(|child| child.is_element()) {
        let field_name = field.tag_name().name().to_string();
        if !allowed.contains(&field_name.as_str()) {
            return Err(ctx.error(
                ContentErrorCode::UnknownField,
                format!("unknown field <{}> in <{}>", field_name, owner),
                field,
            ));
        }
        if fields.insert(field_name.clone(), field).is_some() {
            return Err(ctx.error(
                ContentErrorCode::DuplicateField,
                format!("duplicate field <{}> in <{}>", field_name, owner),
                field,
            ));
        }
    }
    Ok(fields)
}

fn required_field<'a, 'input>(
    ctx: &ParseContext<'_, '_>,
    fields: &HashMap<String, Node<'a, 'input>>,
    owner_node: Node<'_, '_>,
    owner: &str,
    field_name: &str,
) -> Result<Node<'a, 'input>, ContentCompileError> {
    fields.get(field_name).copied().ok_or_else(|| {
        ctx.error(
            ContentErrorCode::MissingField,
            format!("missing required field <{}> in <{}>", field_name, owner),
            owner_node,
        )
    })
}

fn required_text(
    ctx: &ParseContext<'_, '_>,
    node: Node<'_, '_>,
    field_name: &str,
) -> Result<String, ContentCompileError> {
    let value = node.text().map(str::trim).unwrap_or_default().to_string();
    if value.is_empty() {
        return Err(ctx.error(
            ContentErrorCode::MissingField,
            format!("field <{}> must not be empty", field_name),
            node,
        ));
    }
    Ok(value)
}

fn parse_u32(
    ctx: &ParseContext<'_, '_>,
    node: Node<'_, '_>,
    field_name: &str,
    min: u32,
) -> Result<u32, ContentCompileError> {
    let value = required_text(ctx, node, field_name)?;
    let parsed = value.parse::<u32>().map_err(|_| {
        ctx.error(
            ContentErrorCode::InvalidValue,
            format!("{} '{}' is not a valid non-negative integer", field_name, value),
            node,
        )
    })?;
    if parsed < min {
        return Err(ctx.error(
            ContentErrorCode::InvalidValue,
            format!("{} must be >= {}", field_name, min),
            node,
        ));
    }
    Ok(parsed)
}

fn parse_bool(
    ctx: &ParseContext<'_, '_>,
    node: Node<'_, '_>,
    field_name: &str,
) -> Result<bool, ContentCompileError> {
    match required_text(ctx, node, field_name)?.as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(ctx.error(
            ContentErrorCode::InvalidValue,
            format!("{} '{}' must be true or false", field_name, other),
            node,
        )),
    }
}

fn parse_resource_amount(
    ctx: &ParseContext<'_, '_>,
    node: Node<'_, '_>,
    field_name: &str,
) -> Result<ResourceAmountDef, ContentCompileError> {
    let value = required_text(ctx, node, field_name)?;
    let invalid = || {
        ctx.error(
            ContentErrorCode::InvalidValue,
            format!(
                "{} '{}' must look like resource:amount with amount >= 1",
                field_name, value
            ),
            node,
        )
    };
    let (resource, amount) = value.split_once(':').ok_or_else(invalid)?;
    let resource = resource.trim();
    let amount = amount.trim().parse::<u32>().map_err(|_| invalid())?;
    if resource.is_empty() || amount == 0 {
        return Err(invalid());
    }
    Ok(ResourceAmountDef {
        resource: resource.to_string(),
        amount,
    })
}

fn parse_resource_list(
    ctx: &ParseContext<'_, '_>,
    node: Node<'_, '_>,
    field_name: &str,
) -> Result<Vec<ResourceAmountDef>, ContentCompileError> {
    list_items(ctx, node, field_name)?
        .into_iter()
        .map(|item| parse_resource_amount(ctx, item, field_name))
        .collect()
}

fn list_items<'a, 'input>(
    ctx: &ParseContext<'_, '_>,
    node: Node<'a, 'input>,
    field_name: &str,
) -> Result<Vec<Node<'a, 'input>>, ContentCompileError> {
    let mut items = Vec::new();
    for child in node.children().filter(|child| child.is_element()) {
        if child.tag_name().name() != "li" {
            return Err(ctx.error(
                ContentErrorCode::UnknownField,
                format!(
                    "<{}> may only contain <li> items, found <{}>",
                    field_name,
                    child.tag_name().name()
                ),
                child,
            ));
        }
        items.push(child);
    }
    Ok(items)
}

struct ReadError {
    path: PathBuf,
    source: std::io::Error,
}

fn collect_xml_files_sorted(root: &Path) -> Result<Vec<(String, PathBuf)>, ReadError> {
    let mut files = Vec::<PathBuf>::new();
    collect_recursive(root, &mut files)?;
    let mut named = files
        .into_iter()
        .map(|path| {
            let rel = path.strip_prefix(root).unwrap_or(&path);
            (normalize_rel_path(rel), path.clone())
        })
        .collect::<Vec<_>>();
    named.sort_by(|(a, _), (b, _)| a.cmp(b));
    Ok(named)
}

fn collect_recursive(current: &Path, files: &mut Vec<PathBuf>) -> Result<(), ReadError> {
    let entries = fs::read_dir(current).map_err(|source| ReadError {
        path: current.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| ReadError {
            path: current.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_recursive(&path, files)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
        {
            files.push(path);
        }
    }
    Ok(())
}

fn normalize_rel_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn read_error(path: PathBuf, source: std::io::Error) -> ContentCompileError {
    ContentCompileError {
        code: ContentErrorCode::ReadFile,
        message: format!("failed to read XML source: {source}"),
        file_path: path,
        location: None,
    }
}
