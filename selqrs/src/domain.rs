//! Domain model: the static description of a source table, its related
//! schemas, and the join graph that bounds what a query may reference.
//!
//! Join specs are tagged by `type`; unknown tags deserialize into
//! [`JoinKind::Unknown`] so the planner can fall back to a basic left join
//! instead of failing the whole domain. Nested joins flatten into an arena of
//! [`ResolvedJoin`] records at configure time.

use std::collections::BTreeMap;

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Result, SelqError};
use crate::expr::FilterExpr;
use crate::validation::DomainIssue;

/// Alias of the source table in every generated query.
pub const ROOT_JOIN: &str = "selq_root";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    #[serde(default)]
    pub name: Option<String>,
    pub source: SchemaDef,
    #[serde(default)]
    pub schemas: BTreeMap<String, SchemaDef>,
    #[serde(default)]
    pub joins: BTreeMap<String, JoinSpec>,
    #[serde(default)]
    pub default_selected: Vec<String>,
    #[serde(default)]
    pub required_filters: Vec<FilterExpr>,
    /// Named, reusable filter definitions a caller can apply by name.
    #[serde(default)]
    pub filters: BTreeMap<String, FilterExpr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDef {
    pub table: String,
    pub primary_key: String,
    pub fields: Vec<String>,
    #[serde(default)]
    pub redact_fields: Vec<String>,
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnDef>,
    #[serde(default)]
    pub associations: BTreeMap<String, Association>,
}

impl SchemaDef {
    pub fn field_type(&self, field: &str) -> FieldType {
        self.columns
            .get(field)
            .map(|c| c.col_type)
            .unwrap_or(FieldType::String)
    }

    pub fn is_redacted(&self, field: &str) -> bool {
        self.redact_fields.iter().any(|f| f == field)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ColumnDef {
    #[serde(rename = "type")]
    pub col_type: FieldType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Integer,
    Float,
    Decimal,
    Numeric,
    String,
    Text,
    Boolean,
    Date,
    NaiveDatetime,
    UtcDatetime,
    Unknown,
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Unrecognized type names map to Unknown rather than failing the
        // whole domain; they stay compatible with every set-op class.
        let tag = String::deserialize(deserializer)?;
        Ok(match tag.as_str() {
            "integer" => FieldType::Integer,
            "float" => FieldType::Float,
            "decimal" => FieldType::Decimal,
            "numeric" => FieldType::Numeric,
            "string" => FieldType::String,
            "text" => FieldType::Text,
            "boolean" => FieldType::Boolean,
            "date" => FieldType::Date,
            "naive_datetime" => FieldType::NaiveDatetime,
            "utc_datetime" => FieldType::UtcDatetime,
            _ => FieldType::Unknown,
        })
    }
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Decimal => "decimal",
            FieldType::Numeric => "numeric",
            FieldType::String => "string",
            FieldType::Text => "text",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::NaiveDatetime => "naive_datetime",
            FieldType::UtcDatetime => "utc_datetime",
            FieldType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Association {
    pub queryable: String,
    #[serde(default)]
    pub field: Option<String>,
    pub owner_key: String,
    pub related_key: String,
    #[serde(default)]
    pub cardinality: Cardinality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    #[default]
    One,
    Many,
}

/// A join declaration. The `type`-tagged configuration lives in [`JoinKind`];
/// `joins` nests further joins whose dependency is this one.
#[derive(Debug, Clone)]
pub struct JoinSpec {
    pub kind: JoinKind,
    pub name: Option<String>,
    pub joins: BTreeMap<String, JoinSpec>,
}

impl Serialize for JoinSpec {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = self.kind.to_map().map_err(serde::ser::Error::custom)?;
        if let Some(name) = &self.name {
            map.insert("name".to_string(), Value::String(name.clone()));
        }
        if !self.joins.is_empty() {
            let joins = serde_json::to_value(&self.joins).map_err(serde::ser::Error::custom)?;
            map.insert("joins".to_string(), joins);
        }
        Value::Object(map).serialize(serializer)
    }
}

impl JoinSpec {
    pub fn basic(kind: JoinKind) -> JoinSpec {
        JoinSpec {
            kind,
            name: None,
            joins: BTreeMap::new(),
        }
    }
}

impl<'de> Deserialize<'de> for JoinSpec {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut value = Value::deserialize(deserializer)?;
        let map = value
            .as_object_mut()
            .ok_or_else(|| de::Error::custom("join spec must be a map"))?;
        let name = match map.remove("name") {
            Some(Value::String(s)) => Some(s),
            Some(Value::Null) | None => None,
            Some(other) => {
                return Err(de::Error::custom(format!(
                    "join name must be a string, got {other}"
                )))
            }
        };
        let joins = match map.remove("joins") {
            Some(v) => serde_json::from_value(v).map_err(de::Error::custom)?,
            None => BTreeMap::new(),
        };
        let kind = JoinKind::from_value(Value::Object(map.clone())).map_err(de::Error::custom)?;
        Ok(JoinSpec { kind, name, joins })
    }
}

#[derive(Debug, Clone)]
pub enum JoinKind {
    Left,
    Inner,
    SelfJoin(SelfJoinConfig),
    Lateral(LateralConfig),
    Cross,
    FullOuter(FullOuterConfig),
    Conditional(ConditionalConfig),
    StarDimension(StarConfig),
    SnowflakeDimension(SnowflakeConfig),
    Tagging(TaggingConfig),
    Hierarchical(HierarchyConfig),
    Parameterized(ParameterizedConfig),
    Unknown(String),
}

impl JoinKind {
    pub fn tag(&self) -> &str {
        match self {
            JoinKind::Left => "left",
            JoinKind::Inner => "inner",
            JoinKind::SelfJoin(_) => "self",
            JoinKind::Lateral(_) => "lateral",
            JoinKind::Cross => "cross",
            JoinKind::FullOuter(_) => "full_outer",
            JoinKind::Conditional(_) => "conditional",
            JoinKind::StarDimension(_) => "star_dimension",
            JoinKind::SnowflakeDimension(_) => "snowflake_dimension",
            JoinKind::Tagging(_) => "tagging",
            JoinKind::Hierarchical(_) => "hierarchical",
            JoinKind::Parameterized(_) => "parameterized",
            JoinKind::Unknown(tag) => tag,
        }
    }

    fn to_map(&self) -> std::result::Result<serde_json::Map<String, Value>, serde_json::Error> {
        let mut map = match self {
            JoinKind::SelfJoin(cfg) => obj(serde_json::to_value(cfg)?),
            JoinKind::Lateral(cfg) => obj(serde_json::to_value(cfg)?),
            JoinKind::FullOuter(cfg) => obj(serde_json::to_value(cfg)?),
            JoinKind::Conditional(cfg) => obj(serde_json::to_value(cfg)?),
            JoinKind::StarDimension(cfg) => obj(serde_json::to_value(cfg)?),
            JoinKind::SnowflakeDimension(cfg) => obj(serde_json::to_value(cfg)?),
            JoinKind::Tagging(cfg) => obj(serde_json::to_value(cfg)?),
            JoinKind::Hierarchical(cfg) => obj(serde_json::to_value(cfg)?),
            JoinKind::Parameterized(cfg) => obj(serde_json::to_value(cfg)?),
            JoinKind::Left | JoinKind::Inner | JoinKind::Cross | JoinKind::Unknown(_) => {
                serde_json::Map::new()
            }
        };
        map.insert("type".to_string(), Value::String(self.tag().to_string()));
        Ok(map)
    }

    fn from_value(value: Value) -> std::result::Result<JoinKind, String> {
        let tag = value
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or("left")
            .to_string();
        let parse = |v: Value| -> std::result::Result<JoinKind, String> {
            let kind = match tag.as_str() {
                "left" => JoinKind::Left,
                "inner" => JoinKind::Inner,
                "self" => JoinKind::SelfJoin(config(v)?),
                "lateral" => JoinKind::Lateral(config(v)?),
                "cross" => JoinKind::Cross,
                "full_outer" => JoinKind::FullOuter(config(v)?),
                "conditional" => JoinKind::Conditional(config(v)?),
                "star_dimension" => JoinKind::StarDimension(config(v)?),
                "snowflake_dimension" => JoinKind::SnowflakeDimension(config(v)?),
                "tagging" => JoinKind::Tagging(config(v)?),
                "hierarchical" => JoinKind::Hierarchical(config(v)?),
                "parameterized" => JoinKind::Parameterized(config(v)?),
                other => JoinKind::Unknown(other.to_string()),
            };
            Ok(kind)
        };
        parse(value)
    }
}

fn config<T: de::DeserializeOwned>(mut value: Value) -> std::result::Result<T, String> {
    if let Some(map) = value.as_object_mut() {
        map.remove("type");
    }
    serde_json::from_value(value).map_err(|e| e.to_string())
}

fn obj(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

impl Serialize for JoinKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let map = self.to_map().map_err(serde::ser::Error::custom)?;
        Value::Object(map).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for JoinKind {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        JoinKind::from_value(value).map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfJoinConfig {
    #[serde(default)]
    pub self_key: Option<String>,
    #[serde(default)]
    pub target_key: Option<String>,
    #[serde(default)]
    pub condition_type: BasicJoinKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasicJoinKind {
    #[default]
    Left,
    Inner,
}

impl BasicJoinKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            BasicJoinKind::Left => "LEFT JOIN",
            BasicJoinKind::Inner => "INNER JOIN",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LateralConfig {
    #[serde(default)]
    pub lateral_query: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullOuterConfig {
    #[serde(default)]
    pub left_key: Option<String>,
    #[serde(default)]
    pub right_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionalConfig {
    #[serde(default)]
    pub conditions: Vec<JoinCondition>,
    #[serde(default)]
    pub condition_type: BasicJoinKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JoinCondition {
    FieldComparison {
        left: String,
        op: String,
        right: String,
    },
    DateRange {
        field: String,
        from: String,
        to: String,
    },
    CustomSql {
        fragment: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StarConfig {
    #[serde(default)]
    pub display_field: Option<String>,
}

impl StarConfig {
    pub fn display(&self) -> &str {
        self.display_field.as_deref().unwrap_or("name")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnowflakeConfig {
    #[serde(default)]
    pub display_field: Option<String>,
    #[serde(default)]
    pub normalization_joins: Vec<NormalizationJoin>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationJoin {
    pub table: String,
    /// Key on the previous table in the chain.
    pub owner_key: String,
    #[serde(default = "default_id_key")]
    pub my_key: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

fn default_id_key() -> String {
    "id".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggingConfig {
    pub join_table: String,
    #[serde(default = "default_name_field")]
    pub tag_field: String,
    pub main_foreign_key: String,
    pub tag_foreign_key: String,
}

fn default_name_field() -> String {
    "name".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "hierarchy_type", rename_all = "snake_case")]
pub enum HierarchyConfig {
    AdjacencyList {
        #[serde(default = "default_id_key")]
        id_field: String,
        #[serde(default = "default_name_field")]
        name_field: String,
        #[serde(default = "default_parent_field")]
        parent_field: String,
        #[serde(default = "default_depth_limit")]
        depth_limit: u32,
        #[serde(default)]
        root_condition: Option<String>,
        #[serde(default)]
        additional_fields: Vec<String>,
    },
    MaterializedPath {
        #[serde(default = "default_path_field")]
        path_field: String,
        #[serde(default = "default_separator")]
        separator: String,
        #[serde(default)]
        root_prefix: Option<String>,
    },
    ClosureTable {
        #[serde(default)]
        closure_table: Option<String>,
        #[serde(default)]
        ancestor_field: Option<String>,
        #[serde(default)]
        descendant_field: Option<String>,
        #[serde(default = "default_depth_field")]
        depth_field: String,
    },
}

fn default_parent_field() -> String {
    "parent_id".to_string()
}

fn default_depth_limit() -> u32 {
    5
}

fn default_path_field() -> String {
    "path".to_string()
}

fn default_separator() -> String {
    "/".to_string()
}

fn default_depth_field() -> String {
    "depth".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterizedConfig {
    #[serde(default)]
    pub parameters: Vec<JoinParamDef>,
    #[serde(default)]
    pub join_condition: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinParamDef {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer,
    Float,
    Boolean,
    Atom,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Float => "float",
            ParamType::Boolean => "boolean",
            ParamType::Atom => "atom",
        }
    }
}

/// A parameterized-join condition template, pre-parsed so instantiation is a
/// table lookup. `$param_<name>` marks a parameter reference.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateFrag {
    Literal(String),
    ParamRef(String),
}

pub fn parse_condition_template(template: &str) -> Vec<TemplateFrag> {
    let mut frags = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("$param_") {
        if start > 0 {
            frags.push(TemplateFrag::Literal(rest[..start].to_string()));
        }
        let after = &rest[start + "$param_".len()..];
        let end = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        frags.push(TemplateFrag::ParamRef(after[..end].to_string()));
        rest = &after[end..];
    }
    if !rest.is_empty() {
        frags.push(TemplateFrag::Literal(rest.to_string()));
    }
    frags
}

/// A join flattened out of the (possibly nested) domain join tree.
#[derive(Debug, Clone)]
pub struct ResolvedJoin {
    pub id: String,
    /// Schema key in `domain.schemas` this join targets.
    pub schema: String,
    pub table: String,
    pub kind: JoinKind,
    /// Parent join id, or `None` when joined directly to the source.
    pub requires_join: Option<String>,
    pub owner_key: String,
    pub related_key: String,
    pub cardinality: Cardinality,
    /// Pre-parsed condition template for parameterized joins.
    pub condition_template: Option<Vec<TemplateFrag>>,
}

/// Flatten the nested join tree into an arena keyed by join id. Fails with a
/// validation error when an association or schema is missing; cycle detection
/// is the validator's job and runs on the same shape.
pub fn resolve_joins(domain: &Domain) -> Result<BTreeMap<String, ResolvedJoin>> {
    let mut arena = BTreeMap::new();
    let mut issues = Vec::new();
    flatten_into(
        domain,
        &domain.source.associations,
        &domain.joins,
        None,
        &mut arena,
        &mut issues,
    );
    if issues.is_empty() {
        Ok(arena)
    } else {
        Err(SelqError::Validation(issues))
    }
}

fn flatten_into(
    domain: &Domain,
    associations: &BTreeMap<String, Association>,
    joins: &BTreeMap<String, JoinSpec>,
    parent: Option<&str>,
    arena: &mut BTreeMap<String, ResolvedJoin>,
    issues: &mut Vec<DomainIssue>,
) {
    for (join_id, spec) in joins {
        let Some(assoc) = associations.get(join_id) else {
            issues.push(DomainIssue::JoinMissingAssociation {
                join: join_id.clone(),
                schema: parent.unwrap_or("source").to_string(),
            });
            continue;
        };
        let Some(schema) = domain.schemas.get(&assoc.queryable) else {
            issues.push(DomainIssue::AssociationInvalidQueryable {
                association: join_id.clone(),
                queryable: assoc.queryable.clone(),
            });
            continue;
        };
        let condition_template = match &spec.kind {
            JoinKind::Parameterized(cfg) => cfg
                .join_condition
                .as_deref()
                .map(parse_condition_template),
            _ => None,
        };
        arena.insert(
            join_id.clone(),
            ResolvedJoin {
                id: join_id.clone(),
                schema: assoc.queryable.clone(),
                table: schema.table.clone(),
                kind: spec.kind.clone(),
                requires_join: parent.map(str::to_string),
                owner_key: assoc.owner_key.clone(),
                related_key: assoc.related_key.clone(),
                cardinality: assoc.cardinality,
                condition_template,
            },
        );
        flatten_into(
            domain,
            &schema.associations,
            &spec.joins,
            Some(join_id),
            arena,
            issues,
        );
    }
}

/// How a derived column renders: a plain table column or a generated
/// expression owned by an advanced join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Plain,
    StarDisplay,
    HierarchyPath,
    HierarchyLevel,
    HierarchyPathArray,
    ClosureDepth,
    ClosureDescendantCount,
    TagList,
    TagArray,
    TagCount,
}

#[derive(Debug, Clone)]
pub struct ColumnEntry {
    /// Lookup key: `"field"` for source columns, `"join.field"` for joined.
    pub key: String,
    pub name: String,
    pub qualified_name: String,
    /// Join id owning the column, [`ROOT_JOIN`] for the source.
    pub source_join: String,
    pub table_alias: String,
    pub field_type: FieldType,
    pub kind: ColumnKind,
}

/// Derive the resolvable column set from the source schema and the flattened
/// join arena. Redacted fields never enter the map.
pub fn derive_columns(
    domain: &Domain,
    joins: &BTreeMap<String, ResolvedJoin>,
) -> BTreeMap<String, ColumnEntry> {
    let mut columns = BTreeMap::new();
    for field in &domain.source.fields {
        if domain.source.is_redacted(field) {
            continue;
        }
        columns.insert(
            field.clone(),
            ColumnEntry {
                key: field.clone(),
                name: field.clone(),
                qualified_name: field.clone(),
                source_join: ROOT_JOIN.to_string(),
                table_alias: ROOT_JOIN.to_string(),
                field_type: domain.source.field_type(field),
                kind: ColumnKind::Plain,
            },
        );
    }
    for (join_id, join) in joins {
        let Some(schema) = domain.schemas.get(&join.schema) else {
            continue;
        };
        for field in &schema.fields {
            if schema.is_redacted(field) {
                continue;
            }
            let key = format!("{join_id}.{field}");
            columns.insert(
                key.clone(),
                ColumnEntry {
                    key,
                    name: field.clone(),
                    qualified_name: format!("{join_id}.{field}"),
                    source_join: join_id.clone(),
                    table_alias: join_id.clone(),
                    field_type: schema.field_type(field),
                    kind: ColumnKind::Plain,
                },
            );
        }
        for (name, field_type, kind) in custom_columns(join) {
            let key = format!("{join_id}.{name}");
            columns.insert(
                key.clone(),
                ColumnEntry {
                    key,
                    name,
                    qualified_name: String::new(),
                    source_join: join_id.clone(),
                    table_alias: join_id.clone(),
                    field_type,
                    kind,
                },
            );
        }
    }
    for entry in columns.values_mut() {
        if entry.qualified_name.is_empty() {
            entry.qualified_name = entry.key.clone();
        }
    }
    columns
}

fn custom_columns(join: &ResolvedJoin) -> Vec<(String, FieldType, ColumnKind)> {
    match &join.kind {
        JoinKind::StarDimension(_) | JoinKind::SnowflakeDimension(_) => vec![(
            "display".to_string(),
            FieldType::String,
            ColumnKind::StarDisplay,
        )],
        JoinKind::Tagging(cfg) => vec![
            (
                format!("{}_list", cfg.tag_field),
                FieldType::String,
                ColumnKind::TagList,
            ),
            (
                format!("{}_array", cfg.tag_field),
                FieldType::Unknown,
                ColumnKind::TagArray,
            ),
            (
                format!("{}_count", cfg.tag_field),
                FieldType::Integer,
                ColumnKind::TagCount,
            ),
        ],
        JoinKind::Hierarchical(HierarchyConfig::AdjacencyList { .. })
        | JoinKind::Hierarchical(HierarchyConfig::MaterializedPath { .. }) => vec![
            ("path".to_string(), FieldType::Text, ColumnKind::HierarchyPath),
            (
                "level".to_string(),
                FieldType::Integer,
                ColumnKind::HierarchyLevel,
            ),
            (
                "path_array".to_string(),
                FieldType::Unknown,
                ColumnKind::HierarchyPathArray,
            ),
        ],
        JoinKind::Hierarchical(HierarchyConfig::ClosureTable { .. }) => vec![
            (
                "depth".to_string(),
                FieldType::Integer,
                ColumnKind::ClosureDepth,
            ),
            (
                "descendant_count".to_string(),
                FieldType::Integer,
                ColumnKind::ClosureDescendantCount,
            ),
        ],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_template_splits_param_refs() {
        let frags = parse_condition_template("category = $param_category AND price < $param_max");
        assert_eq!(
            frags,
            vec![
                TemplateFrag::Literal("category = ".to_string()),
                TemplateFrag::ParamRef("category".to_string()),
                TemplateFrag::Literal(" AND price < ".to_string()),
                TemplateFrag::ParamRef("max".to_string()),
            ]
        );
    }

    #[test]
    fn unknown_join_type_is_preserved() {
        let spec: JoinSpec =
            serde_json::from_value(serde_json::json!({ "type": "quantum" })).unwrap();
        assert!(matches!(spec.kind, JoinKind::Unknown(ref t) if t == "quantum"));
    }
}
