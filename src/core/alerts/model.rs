// Alert model types: the stored record and its typed filter bag.
//
// Records come from an administrator-maintained store. Everything is decoded
// leniently (numbers stored as strings, nulls for unset values) so that the
// evaluator only ever sees well-typed data.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::error::{Error, Result};

pub type AlertId = u64;
pub type UserId = u64;
pub type CourseId = u64;
pub type RoleId = u64;
pub type FieldId = u64;
pub type CohortId = u64;

/// Where a record is rendered on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Alert,
    Banner,
    Notice,
}

/// Notification style for `ContentType::Alert` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    #[default]
    #[serde(rename = "")]
    Plain,
    Error,
    Info,
    Success,
    Warning,
}

/// Body text format, matching the host application's format codes.
pub const FORMAT_HTML: u8 = 1;

/// A stored alert. Read-only to this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(default, deserialize_with = "lenient::id")]
    pub id: AlertId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "contentformat", default = "default_format")]
    pub content_format: u8,
    #[serde(rename = "contenttype", default)]
    pub content_type: ContentType,
    #[serde(rename = "alerttype", default)]
    pub alert_type: AlertType,
    /// Exact page identifier the alert is restricted to.
    #[serde(default, deserialize_with = "lenient::string")]
    pub pagetype: String,
    /// Stored as a JSON text blob; decoded once here.
    #[serde(default, with = "filters_blob")]
    pub filters: AlertFilters,
    /// Unix seconds, `None` or 0 when unset.
    #[serde(rename = "displayfrom", default, deserialize_with = "lenient::timestamp")]
    pub display_from: Option<i64>,
    #[serde(rename = "displayto", default, deserialize_with = "lenient::timestamp")]
    pub display_to: Option<i64>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub enabled: bool,
    #[serde(rename = "sortorder", default, deserialize_with = "lenient::integer")]
    pub sort_order: i64,
}

fn default_format() -> u8 {
    FORMAT_HTML
}

impl Alert {
    pub fn new(pagetype: impl Into<String>) -> Self {
        Self {
            id: 0,
            title: String::new(),
            content: String::new(),
            content_format: FORMAT_HTML,
            content_type: ContentType::Alert,
            alert_type: AlertType::Plain,
            pagetype: pagetype.into(),
            filters: AlertFilters::default(),
            display_from: None,
            display_to: None,
            enabled: true,
            sort_order: 0,
        }
    }

    /// Start of the display window, ignoring non-positive values.
    pub fn starts_at(&self) -> Option<i64> {
        self.display_from.filter(|t| *t > 0)
    }

    /// End of the display window, ignoring non-positive values.
    pub fn ends_at(&self) -> Option<i64> {
        self.display_to.filter(|t| *t > 0)
    }
}

/// Comparison applied between a filter value and stored data.
///
/// Stored as the integer codes 0..=7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "lenient::Lenient", into = "i64")]
pub enum Operator {
    #[default]
    Contains,
    DoesNotContain,
    EqualTo,
    StartsWith,
    EndsWith,
    IsEmpty,
    IsNotDefined,
    IsDefined,
}

impl Operator {
    pub fn all() -> &'static [Operator] {
        &[
            Self::Contains,
            Self::DoesNotContain,
            Self::EqualTo,
            Self::StartsWith,
            Self::EndsWith,
            Self::IsEmpty,
            Self::IsNotDefined,
            Self::IsDefined,
        ]
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Contains => 0,
            Self::DoesNotContain => 1,
            Self::EqualTo => 2,
            Self::StartsWith => 3,
            Self::EndsWith => 4,
            Self::IsEmpty => 5,
            Self::IsNotDefined => 6,
            Self::IsDefined => 7,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::all().iter().copied().find(|op| op.code() == code)
    }

    /// Operators that compare against the filter value and so need one.
    pub fn requires_value(self) -> bool {
        self.code() < 5
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::DoesNotContain => "doesn't contain",
            Self::EqualTo => "is equal to",
            Self::StartsWith => "starts with",
            Self::EndsWith => "ends with",
            Self::IsEmpty => "is empty",
            Self::IsNotDefined => "is not defined",
            Self::IsDefined => "is defined",
        }
    }
}

impl From<Operator> for i64 {
    fn from(op: Operator) -> Self {
        op.code()
    }
}

impl TryFrom<lenient::Lenient> for Operator {
    type Error = Error;

    fn try_from(raw: lenient::Lenient) -> Result<Self> {
        raw.as_i64()
            .and_then(Operator::from_code)
            .ok_or_else(|| Error::InvalidOperator(raw.to_string()))
    }
}

/// Reference to a custom field definition. Id 0 stands for "any field".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "lenient::Lenient", into = "u64")]
pub enum FieldRef {
    Any,
    Id(FieldId),
}

impl From<FieldRef> for u64 {
    fn from(field: FieldRef) -> Self {
        match field {
            FieldRef::Any => 0,
            FieldRef::Id(id) => id,
        }
    }
}

impl From<FieldId> for FieldRef {
    fn from(id: FieldId) -> Self {
        if id == 0 {
            Self::Any
        } else {
            Self::Id(id)
        }
    }
}

impl TryFrom<lenient::Lenient> for FieldRef {
    type Error = Error;

    fn try_from(raw: lenient::Lenient) -> Result<Self> {
        raw.as_i64()
            .and_then(|id| u64::try_from(id).ok())
            .map(FieldRef::from)
            .ok_or_else(|| Error::InvalidFieldRef(raw.to_string()))
    }
}

/// One named filter: `{fld, op, value}` for field filters, `{op, value}` for
/// attribute and cohort filters.
///
/// Blank or null `op` and `fld` entries decode as unset. Unreadable ones are
/// only an error when the filter has a value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawFilterSpec")]
pub struct FilterSpec {
    #[serde(rename = "fld", skip_serializing_if = "Option::is_none")]
    pub field: Option<FieldRef>,
    #[serde(rename = "op")]
    pub operator: Operator,
    pub value: String,
}

/// `FilterSpec` as the store holds it.
#[derive(Deserialize)]
struct RawFilterSpec {
    #[serde(default)]
    fld: Option<lenient::Lenient>,
    #[serde(default)]
    op: Option<lenient::Lenient>,
    #[serde(default, deserialize_with = "lenient::string")]
    value: String,
}

impl TryFrom<RawFilterSpec> for FilterSpec {
    type Error = Error;

    fn try_from(raw: RawFilterSpec) -> Result<Self> {
        let active = !raw.value.is_empty();
        let operator = match raw.op.filter(|op| !op.is_blank()) {
            Some(op) => match Operator::try_from(op) {
                Ok(operator) => operator,
                Err(e) if active => return Err(e),
                Err(_) => Operator::default(),
            },
            None => Operator::default(),
        };
        let field = match raw.fld.filter(|fld| !fld.is_blank()) {
            Some(fld) => match FieldRef::try_from(fld) {
                Ok(field) => Some(field),
                Err(e) if active => return Err(e),
                Err(_) => None,
            },
            None => None,
        };
        Ok(Self {
            field,
            operator,
            value: raw.value,
        })
    }
}

impl FilterSpec {
    pub fn field(field: FieldRef, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            field: Some(field),
            operator,
            value: value.into(),
        }
    }

    pub fn text(operator: Operator, value: impl Into<String>) -> Self {
        Self {
            field: None,
            operator,
            value: value.into(),
        }
    }

    /// Filters are only applied when a value has been entered.
    pub fn is_active(&self) -> bool {
        !self.value.is_empty()
    }
}

/// Set of role ids, stored comma-joined.
///
/// Any non-blank stored text makes the filter active, even when none of its
/// tokens is a role id. Such a filter matches nobody.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoleSet {
    raw: String,
    ids: BTreeSet<RoleId>,
}

impl RoleSet {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let mut ids = BTreeSet::new();
        for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token.parse::<RoleId>() {
                Ok(id) => {
                    ids.insert(id);
                }
                Err(_) => log::warn!("Ignoring invalid role id {:?} in role filter", token),
            }
        }
        Self {
            raw: raw.to_string(),
            ids,
        }
    }

    /// Whether the filter restricts anything at all.
    pub fn is_active(&self) -> bool {
        !self.raw.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = RoleId> + '_ {
        self.ids.iter().copied()
    }

    /// True when any of `roles` is in this set.
    pub fn intersects<'a>(&self, roles: impl IntoIterator<Item = &'a RoleId>) -> bool {
        roles.into_iter().any(|r| self.ids.contains(r))
    }
}

impl FromIterator<RoleId> for RoleSet {
    fn from_iter<I: IntoIterator<Item = RoleId>>(iter: I) -> Self {
        let ids: BTreeSet<RoleId> = iter.into_iter().collect();
        let raw = ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        Self { raw, ids }
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for RoleSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RoleSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = lenient::string(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Names of the filters an alert can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterName {
    CourseCustomField,
    UserProfileField,
    RolesInCourse,
    RolesInSystem,
    Department,
    Institution,
    Cohort,
}

impl FilterName {
    /// Evaluation order.
    pub fn all() -> &'static [FilterName] {
        &[
            Self::CourseCustomField,
            Self::UserProfileField,
            Self::RolesInCourse,
            Self::RolesInSystem,
            Self::Department,
            Self::Institution,
            Self::Cohort,
        ]
    }

    /// Key used in the stored filter blob.
    pub fn key(self) -> &'static str {
        match self {
            Self::CourseCustomField => "coursecustomfield",
            Self::UserProfileField => "userprofilefield",
            Self::RolesInCourse => "rolesincourse",
            Self::RolesInSystem => "rolesinsystem",
            Self::Department => "department",
            Self::Institution => "institution",
            Self::Cohort => "cohort",
        }
    }
}

/// The filter bag. Every entry is independently optional.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlertFilters {
    #[serde(rename = "coursecustomfield", default, skip_serializing_if = "Option::is_none")]
    pub course_custom_field: Option<FilterSpec>,
    #[serde(rename = "userprofilefield", default, skip_serializing_if = "Option::is_none")]
    pub user_profile_field: Option<FilterSpec>,
    #[serde(rename = "rolesincourse", default)]
    pub roles_in_course: RoleSet,
    #[serde(rename = "rolesinsystem", default)]
    pub roles_in_system: RoleSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<FilterSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution: Option<FilterSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cohort: Option<FilterSpec>,
}

impl AlertFilters {
    /// Decode a stored blob. Blank text and `null` decode to no filters.
    pub fn from_json(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(trimmed)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// The spec stored under `name`, for the filters that have one.
    pub fn spec(&self, name: FilterName) -> Option<&FilterSpec> {
        match name {
            FilterName::CourseCustomField => self.course_custom_field.as_ref(),
            FilterName::UserProfileField => self.user_profile_field.as_ref(),
            FilterName::Department => self.department.as_ref(),
            FilterName::Institution => self.institution.as_ref(),
            FilterName::Cohort => self.cohort.as_ref(),
            FilterName::RolesInCourse | FilterName::RolesInSystem => None,
        }
    }

    /// The active spec under `name`, if a value has been entered.
    pub fn active_spec(&self, name: FilterName) -> Option<&FilterSpec> {
        self.spec(name).filter(|spec| spec.is_active())
    }
}

/// The `filters` column holds JSON text. Inline objects are accepted too.
mod filters_blob {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    use super::AlertFilters;

    pub fn serialize<S: Serializer>(
        filters: &AlertFilters,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let blob =
            serde_json::to_string(filters).map_err(<S::Error as serde::ser::Error>::custom)?;
        serializer.serialize_str(&blob)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<AlertFilters, D::Error> {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(AlertFilters::default()),
            Some(Value::String(blob)) => AlertFilters::from_json(&blob).map_err(D::Error::custom),
            Some(value) => serde_json::from_value(value).map_err(D::Error::custom),
        }
    }
}

/// Decoders for values the store may hold as numbers, numeric strings,
/// booleans or null.
mod lenient {
    use std::fmt;

    use serde::{Deserialize, Deserializer};

    #[derive(Debug, Clone, Deserialize)]
    #[serde(untagged)]
    pub enum Lenient {
        Bool(bool),
        Int(i64),
        Float(f64),
        Text(String),
    }

    impl Lenient {
        pub fn is_blank(&self) -> bool {
            matches!(self, Self::Text(s) if s.trim().is_empty())
        }

        pub fn as_i64(&self) -> Option<i64> {
            match self {
                Self::Bool(b) => Some(i64::from(*b)),
                Self::Int(n) => Some(*n),
                Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
                Self::Float(_) => None,
                Self::Text(s) => s.trim().parse().ok(),
            }
        }
    }

    impl fmt::Display for Lenient {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::Bool(b) => write!(f, "{b}"),
                Self::Int(n) => write!(f, "{n}"),
                Self::Float(x) => write!(f, "{x}"),
                Self::Text(s) => f.write_str(s),
            }
        }
    }

    pub fn string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(Option::<Lenient>::deserialize(deserializer)?
            .map(|raw| raw.to_string())
            .unwrap_or_default())
    }

    pub fn integer<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        Ok(Option::<Lenient>::deserialize(deserializer)?
            .and_then(|raw| raw.as_i64())
            .unwrap_or_default())
    }

    pub fn id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        Ok(u64::try_from(integer(deserializer)?).unwrap_or_default())
    }

    pub fn timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        Ok(Option::<Lenient>::deserialize(deserializer)?
            .and_then(|raw| raw.as_i64())
            .filter(|t| *t > 0))
    }

    pub fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(integer(deserializer)? != 0)
    }
}
