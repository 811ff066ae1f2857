//! Declarative resource schemas.
//!
//! Every CMS collection is described by one static [`ResourceSpec`]: its
//! table, its fields and their constraints, how records are looked up, which
//! flag decides public visibility, its natural order and the filters it
//! accepts. The CRUD engine, the validator and both stores are driven by these
//! tables, so adding a collection means adding data rather than code.

use std::{cmp::Ordering, collections::BTreeMap};

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer, ser::SerializeMap};
use uuid::Uuid;

/// Kind of value a field holds, with its format constraints.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// Free text of at least `min` characters.
    Text { min: usize },
    Email,
    /// Absolute URL. Optional URL fields treat `""` as absent.
    Url,
    /// Lowercase letters, digits and hyphens.
    Slug,
    Choice(&'static [&'static str]),
    Integer { min: Option<i64>, max: Option<i64> },
    Decimal,
    Flag,
    /// Ordered sequence of strings.
    List { min: usize },
    /// RFC 3339 timestamp or plain `YYYY-MM-DD` date.
    Timestamp,
    /// Identifier of a record in `target`.
    Reference { target: &'static ResourceSpec },
}

/// Value applied on create when the field is omitted.
#[derive(Debug, Clone, Copy)]
pub enum Fallback {
    Text(&'static str),
    Integer(i64),
    Flag(bool),
    EmptyList,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// JSON name (camelCase).
    pub name: &'static str,
    /// Storage column (snake_case).
    pub column: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// `false` for server-maintained fields (view counters, submission
    /// metadata). Input for them is ignored.
    pub writable: bool,
    /// Accepted on updates only; creation applies the fallback.
    pub update_only: bool,
    /// Applied on create when omitted. A field with a fallback is never
    /// null, so updates may not clear it.
    pub fallback: Option<Fallback>,
}

impl FieldSpec {
    const fn new(name: &'static str, column: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            column,
            kind,
            required: false,
            writable: true,
            update_only: false,
            fallback: None,
        }
    }

    pub const fn text(name: &'static str, column: &'static str, min: usize) -> Self {
        Self::new(name, column, FieldKind::Text { min })
    }

    pub const fn email(name: &'static str, column: &'static str) -> Self {
        Self::new(name, column, FieldKind::Email)
    }

    pub const fn url(name: &'static str, column: &'static str) -> Self {
        Self::new(name, column, FieldKind::Url)
    }

    pub const fn slug(name: &'static str, column: &'static str) -> Self {
        Self::new(name, column, FieldKind::Slug)
    }

    pub const fn choice(
        name: &'static str,
        column: &'static str,
        options: &'static [&'static str],
    ) -> Self {
        Self::new(name, column, FieldKind::Choice(options))
    }

    pub const fn integer(name: &'static str, column: &'static str) -> Self {
        Self::new(name, column, FieldKind::Integer { min: None, max: None })
    }

    pub const fn ranged(name: &'static str, column: &'static str, min: i64, max: i64) -> Self {
        Self::new(
            name,
            column,
            FieldKind::Integer {
                min: Some(min),
                max: Some(max),
            },
        )
    }

    pub const fn decimal(name: &'static str, column: &'static str) -> Self {
        Self::new(name, column, FieldKind::Decimal)
    }

    pub const fn flag(name: &'static str, column: &'static str) -> Self {
        Self::new(name, column, FieldKind::Flag)
    }

    pub const fn list(name: &'static str, column: &'static str) -> Self {
        Self::new(name, column, FieldKind::List { min: 0 })
    }

    pub const fn timestamp(name: &'static str, column: &'static str) -> Self {
        Self::new(name, column, FieldKind::Timestamp)
    }

    pub const fn reference(
        name: &'static str,
        column: &'static str,
        target: &'static ResourceSpec,
    ) -> Self {
        Self::new(name, column, FieldKind::Reference { target })
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub const fn update_only(mut self) -> Self {
        self.update_only = true;
        self
    }

    pub const fn or(mut self, fallback: Fallback) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Lists only: at least `min` entries.
    pub const fn at_least(mut self, min: usize) -> Self {
        if let FieldKind::List { .. } = self.kind {
            self.kind = FieldKind::List { min };
        }
        self
    }
}

/// How single records are addressed in `/api/{resource}/{key}`.
#[derive(Debug, Clone, Copy)]
pub enum Lookup {
    Id,
    /// A unique field such as `slug`.
    Key(&'static str),
    /// Identifier first, then the unique field.
    KeyOrId(&'static str),
}

/// Which flag decides whether an anonymous caller may read a record.
#[derive(Debug, Clone, Copy)]
pub enum Visibility {
    Always,
    /// Boolean field; `true` is public. `param` is the admin filter name.
    Flag {
        field: &'static str,
        param: &'static str,
    },
    /// Enumerated status field; `public` is the visible value.
    Status {
        field: &'static str,
        public: &'static str,
    },
    /// Never public: listing and reading need an admin session.
    AdminOnly,
}

/// Who may create records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Admin session required for every write.
    Cms,
    /// Anonymous creation (lead capture); everything else stays admin-only.
    PublicSubmission,
}

#[derive(Debug, Clone, Copy)]
pub struct Sort {
    pub field: &'static str,
    pub descending: bool,
}

impl Sort {
    pub const fn asc(field: &'static str) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    pub const fn desc(field: &'static str) -> Self {
        Self {
            field,
            descending: true,
        }
    }
}

/// Query parameter mapped to an equality condition on a field.
#[derive(Debug, Clone, Copy)]
pub struct Filter {
    pub param: &'static str,
    pub field: &'static str,
}

impl Filter {
    pub const fn on(param: &'static str, field: &'static str) -> Self {
        Self { param, field }
    }
}

/// Records of another (or the same) collection pointing at this one. Deleting
/// a record with dependents is refused.
#[derive(Debug, Clone, Copy)]
pub struct Dependent {
    pub collection: &'static ResourceSpec,
    pub field: &'static str,
}

/// Allowed-transition predicate for a workflow field.
#[derive(Debug, Clone, Copy)]
pub struct Workflow {
    pub field: &'static str,
    pub allows: fn(from: &str, to: &str) -> bool,
}

pub struct ResourceSpec {
    /// URL segment under `/api`.
    pub segment: &'static str,
    pub table: &'static str,
    /// Human label used in messages.
    pub label: &'static str,
    pub fields: &'static [FieldSpec],
    pub lookup: Lookup,
    /// Fields whose values must be unique across the collection.
    pub unique: &'static [&'static str],
    pub visibility: Visibility,
    pub access: Access,
    pub order: &'static [Sort],
    pub filters: &'static [Filter],
    pub default_limit: i64,
    /// Self-reference making the collection a tree.
    pub parent: Option<&'static str>,
    pub dependents: &'static [Dependent],
    pub view_counter: Option<&'static str>,
    pub workflow: Option<Workflow>,
    /// Stamp `ipAddress` and `userAgent` from the request on creation.
    pub captures_client: bool,
}

/// Pseudo-fields present on every record.
pub const ID: &str = "id";
pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";

const NEWEST_FIRST: &[Sort] = &[Sort::desc(CREATED_AT)];

/// Largest page a caller may request.
pub const MAX_LIMIT: i64 = 100;

impl ResourceSpec {
    pub const fn new(
        segment: &'static str,
        table: &'static str,
        label: &'static str,
        fields: &'static [FieldSpec],
    ) -> Self {
        Self {
            segment,
            table,
            label,
            fields,
            lookup: Lookup::Id,
            unique: &[],
            visibility: Visibility::Always,
            access: Access::Cms,
            order: NEWEST_FIRST,
            filters: &[],
            default_limit: 50,
            parent: None,
            dependents: &[],
            view_counter: None,
            workflow: None,
            captures_client: false,
        }
    }

    pub const fn lookup(mut self, lookup: Lookup) -> Self {
        self.lookup = lookup;
        self
    }

    pub const fn unique(mut self, fields: &'static [&'static str]) -> Self {
        self.unique = fields;
        self
    }

    pub const fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Anonymous creation with client capture; reads stay admin-only.
    pub const fn submission(mut self) -> Self {
        self.access = Access::PublicSubmission;
        self.visibility = Visibility::AdminOnly;
        self.captures_client = true;
        self
    }

    pub const fn order(mut self, order: &'static [Sort]) -> Self {
        self.order = order;
        self
    }

    pub const fn filters(mut self, filters: &'static [Filter]) -> Self {
        self.filters = filters;
        self
    }

    pub const fn limit(mut self, default_limit: i64) -> Self {
        self.default_limit = default_limit;
        self
    }

    pub const fn tree(mut self, parent: &'static str) -> Self {
        self.parent = Some(parent);
        self
    }

    pub const fn dependents(mut self, dependents: &'static [Dependent]) -> Self {
        self.dependents = dependents;
        self
    }

    pub const fn counts_views(mut self, field: &'static str) -> Self {
        self.view_counter = Some(field);
        self
    }

    pub const fn workflow(mut self, workflow: Workflow) -> Self {
        self.workflow = Some(workflow);
        self
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Storage column for a field or pseudo-field name.
    pub fn column(&self, name: &str) -> Option<&'static str> {
        match name {
            ID => Some("id"),
            CREATED_AT => Some("created_at"),
            UPDATED_AT => Some("updated_at"),
            _ => self.field(name).map(|f| f.column),
        }
    }

    pub fn is_admin_only(&self) -> bool {
        matches!(self.visibility, Visibility::AdminOnly)
    }
}

// Specs reference each other (and themselves), so only the name is printed.
impl std::fmt::Debug for ResourceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ResourceSpec").field(&self.segment).finish()
    }
}

impl PartialEq for ResourceSpec {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table
    }
}

/// A typed field value, as validated and as stored.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Decimal(f64),
    Flag(bool),
    List(Vec<String>),
    Timestamp(DateTime<Utc>),
    Reference(Uuid),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            FieldValue::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<Uuid> {
        match self {
            FieldValue::Reference(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Sort comparison. Nulls sort after values, as Postgres does for `ASC`.
    pub fn sort_cmp(&self, other: &FieldValue) -> Ordering {
        use FieldValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Greater,
            (_, Null) => Ordering::Less,
            (Text(a), Text(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Decimal(a), Decimal(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Flag(a), Flag(b)) => a.cmp(b),
            (Timestamp(a), Timestamp(b)) => a.cmp(b),
            (Reference(a), Reference(b)) => a.cmp(b),
            (List(a), List(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Null => serializer.serialize_none(),
            FieldValue::Text(s) => serializer.serialize_str(s),
            FieldValue::Integer(n) => serializer.serialize_i64(*n),
            FieldValue::Decimal(n) => serializer.serialize_f64(*n),
            FieldValue::Flag(b) => serializer.serialize_bool(*b),
            FieldValue::List(items) => items.serialize(serializer),
            FieldValue::Timestamp(at) => at.serialize(serializer),
            FieldValue::Reference(id) => id.serialize(serializer),
        }
    }
}

/// Field name → value, for validated input and stored records alike.
pub type Document = BTreeMap<&'static str, FieldValue>;

/// Record
///
/// One stored row of any collection: the fixed identity and timestamps plus
/// the collection-specific fields, serialized flat as a single JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: Uuid,
    pub fields: Document,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    pub fn get(&self, name: &str) -> &FieldValue {
        match self.fields.get(name) {
            Some(value) => value,
            None => &FieldValue::Null,
        }
    }

    /// Value used for ordering, including the pseudo-fields.
    pub fn sort_key(&self, name: &str) -> FieldValue {
        match name {
            ID => FieldValue::Reference(self.id),
            CREATED_AT => FieldValue::Timestamp(self.created_at),
            UPDATED_AT => FieldValue::Timestamp(self.updated_at),
            _ => self.get(name).clone(),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 3))?;
        map.serialize_entry(ID, &self.id)?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.serialize_entry(CREATED_AT, &self.created_at)?;
        map.serialize_entry(UPDATED_AT, &self.updated_at)?;
        map.end()
    }
}

/// Equality condition used by list and count queries. `Null` matches absent
/// values (`IS NULL`).
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: &'static str,
    pub value: FieldValue,
}

impl Condition {
    pub fn eq(field: &'static str, value: FieldValue) -> Self {
        Self { field, value }
    }

    pub fn matches(&self, record: &Record) -> bool {
        record.sort_key(self.field) == self.value
    }
}

/// A filtered, ordered, windowed read.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub conditions: Vec<Condition>,
    pub offset: i64,
    pub limit: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serializes_flat_with_identity_first() {
        let mut fields = Document::new();
        fields.insert("title", FieldValue::Text("Demo".into()));
        fields.insert(
            "technologies",
            FieldValue::List(vec!["Next.js".into(), "AI".into()]),
        );
        fields.insert("clientName", FieldValue::Null);
        let record = Record {
            id: Uuid::nil(),
            fields,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["title"], "Demo");
        assert_eq!(json["technologies"], serde_json::json!(["Next.js", "AI"]));
        assert!(json["clientName"].is_null());
        assert_eq!(json["id"], Uuid::nil().to_string());
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn nulls_sort_last() {
        let mut values = vec![
            FieldValue::Integer(3),
            FieldValue::Null,
            FieldValue::Integer(1),
        ];
        values.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(
            values,
            vec![FieldValue::Integer(1), FieldValue::Integer(3), FieldValue::Null]
        );
    }
}
