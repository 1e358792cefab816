//! Lookup services the evaluator depends on.
//!
//! The host application owns users, courses, custom fields, cohorts and role
//! assignments. This module describes the read-only view the evaluator needs
//! (`Directory`) and provides an in-memory implementation that can be loaded
//! from a JSON snapshot.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::alerts::model::{CohortId, CourseId, FieldId, RoleId, UserId};
use super::error::{Error, Result};

/// Navigational scope a page is rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PageContext {
    #[default]
    System,
    Course(CourseId),
    /// An activity inside a course.
    Module { course: CourseId, module: u64 },
}

impl PageContext {
    /// The enclosing context, `None` at the system level.
    pub fn parent(self) -> Option<PageContext> {
        match self {
            Self::System => None,
            Self::Course(_) => Some(Self::System),
            Self::Module { course, .. } => Some(Self::Course(course)),
        }
    }

    /// This context followed by each of its ancestors.
    pub fn lineage(self) -> impl Iterator<Item = PageContext> {
        std::iter::successors(Some(self), |ctx| ctx.parent())
    }
}

impl fmt::Display for PageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("system"),
            Self::Course(id) => write!(f, "course:{id}"),
            Self::Module { course, module } => write!(f, "module:{course}:{module}"),
        }
    }
}

impl FromStr for PageContext {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidContext(s.to_string());
        let parts: Vec<_> = s.trim().split(':').collect();
        match parts.as_slice() {
            ["system"] => Ok(Self::System),
            ["course", id] => id.parse().map(Self::Course).map_err(|_| invalid()),
            ["module", course, module] => {
                let course = course.parse().map_err(|_| invalid())?;
                let module = module.parse().map_err(|_| invalid())?;
                Ok(Self::Module { course, module })
            }
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for PageContext {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PageContext> for String {
    fn from(ctx: PageContext) -> Self {
        ctx.to_string()
    }
}

/// Plain text attributes stored on the user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserAttribute {
    Department,
    Institution,
}

impl UserAttribute {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Department => "Department",
            Self::Institution => "Institution",
        }
    }
}

/// An administrator-defined custom field on courses or users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: FieldId,
    pub shortname: String,
    pub name: String,
    /// Category the field is grouped under; course fields only.
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cohort {
    pub id: CohortId,
    #[serde(default)]
    pub idnumber: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub shortname: String,
    #[serde(default)]
    pub name: String,
}

impl Role {
    /// Custom name if set, otherwise the shortname.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.shortname
        } else {
            &self.name
        }
    }
}

/// Read-only lookups against the host application's data.
pub trait Directory {
    /// Custom field definitions attached to courses.
    fn course_fields(&self) -> Vec<FieldDefinition>;

    /// Stored `(field, value)` pairs for a course. A field with no entry is
    /// not defined for that course.
    fn course_field_data(&self, course: CourseId) -> Vec<(FieldId, String)>;

    /// Custom profile field definitions attached to users.
    fn user_fields(&self) -> Vec<FieldDefinition>;

    fn user_field_data(&self, user: UserId) -> Vec<(FieldId, String)>;

    /// `None` when the user does not exist.
    fn user_attribute(&self, user: UserId, attribute: UserAttribute) -> Option<String>;

    fn cohorts(&self) -> Vec<Cohort>;

    fn is_cohort_member(&self, cohort: CohortId, user: UserId) -> bool;

    /// Roles assigned to `user` directly in `context`.
    fn role_assignments(&self, user: UserId, context: PageContext) -> Vec<RoleId>;

    fn roles(&self) -> Vec<Role>;

    fn course_field(&self, id: FieldId) -> Option<FieldDefinition> {
        self.course_fields().into_iter().find(|f| f.id == id)
    }

    fn user_field(&self, id: FieldId) -> Option<FieldDefinition> {
        self.user_fields().into_iter().find(|f| f.id == id)
    }

    /// Roles held by `user` in `context`, optionally including roles
    /// assigned in any enclosing context.
    fn user_roles(&self, user: UserId, context: PageContext, include_parents: bool) -> BTreeSet<RoleId> {
        if include_parents {
            context
                .lineage()
                .flat_map(|ctx| self.role_assignments(user, ctx))
                .collect()
        } else {
            self.role_assignments(user, context).into_iter().collect()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValue {
    pub instance: u64,
    pub field: FieldId,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub institution: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortMember {
    pub cohort: CohortId,
    pub user: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub user: UserId,
    pub role: RoleId,
    pub context: PageContext,
}

/// Directory snapshot held in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryDirectory {
    #[serde(default)]
    pub users: Vec<UserRecord>,
    #[serde(default)]
    pub course_fields: Vec<FieldDefinition>,
    #[serde(default)]
    pub course_data: Vec<FieldValue>,
    #[serde(default)]
    pub user_fields: Vec<FieldDefinition>,
    #[serde(default)]
    pub user_data: Vec<FieldValue>,
    #[serde(default)]
    pub cohorts: Vec<Cohort>,
    #[serde(default)]
    pub cohort_members: Vec<CohortMember>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub role_assignments: Vec<RoleAssignment>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot written as JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn with_user(mut self, id: UserId, department: &str, institution: &str) -> Self {
        self.users.push(UserRecord {
            id,
            department: department.to_string(),
            institution: institution.to_string(),
        });
        self
    }

    pub fn with_course_field(mut self, id: FieldId, shortname: &str, name: &str, category: &str) -> Self {
        self.course_fields.push(FieldDefinition {
            id,
            shortname: shortname.to_string(),
            name: name.to_string(),
            category: category.to_string(),
        });
        self
    }

    pub fn with_course_value(mut self, course: CourseId, field: FieldId, value: &str) -> Self {
        self.course_data.push(FieldValue {
            instance: course,
            field,
            value: value.to_string(),
        });
        self
    }

    pub fn with_user_field(mut self, id: FieldId, shortname: &str, name: &str) -> Self {
        self.user_fields.push(FieldDefinition {
            id,
            shortname: shortname.to_string(),
            name: name.to_string(),
            category: String::new(),
        });
        self
    }

    pub fn with_user_value(mut self, user: UserId, field: FieldId, value: &str) -> Self {
        self.user_data.push(FieldValue {
            instance: user,
            field,
            value: value.to_string(),
        });
        self
    }

    pub fn with_cohort(mut self, id: CohortId, idnumber: &str, name: &str, members: &[UserId]) -> Self {
        self.cohorts.push(Cohort {
            id,
            idnumber: idnumber.to_string(),
            name: name.to_string(),
        });
        self.cohort_members
            .extend(members.iter().map(|user| CohortMember { cohort: id, user: *user }));
        self
    }

    pub fn with_role(mut self, id: RoleId, shortname: &str, name: &str) -> Self {
        self.roles.push(Role {
            id,
            shortname: shortname.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn with_assignment(mut self, user: UserId, role: RoleId, context: PageContext) -> Self {
        self.role_assignments.push(RoleAssignment { user, role, context });
        self
    }
}

impl Directory for MemoryDirectory {
    fn course_fields(&self) -> Vec<FieldDefinition> {
        self.course_fields.clone()
    }

    fn course_field_data(&self, course: CourseId) -> Vec<(FieldId, String)> {
        self.course_data
            .iter()
            .filter(|d| d.instance == course)
            .map(|d| (d.field, d.value.clone()))
            .collect()
    }

    fn user_fields(&self) -> Vec<FieldDefinition> {
        self.user_fields.clone()
    }

    fn user_field_data(&self, user: UserId) -> Vec<(FieldId, String)> {
        self.user_data
            .iter()
            .filter(|d| d.instance == user)
            .map(|d| (d.field, d.value.clone()))
            .collect()
    }

    fn user_attribute(&self, user: UserId, attribute: UserAttribute) -> Option<String> {
        let record = self.users.iter().find(|u| u.id == user)?;
        Some(match attribute {
            UserAttribute::Department => record.department.clone(),
            UserAttribute::Institution => record.institution.clone(),
        })
    }

    fn cohorts(&self) -> Vec<Cohort> {
        self.cohorts.clone()
    }

    fn is_cohort_member(&self, cohort: CohortId, user: UserId) -> bool {
        self.cohort_members
            .iter()
            .any(|m| m.cohort == cohort && m.user == user)
    }

    fn role_assignments(&self, user: UserId, context: PageContext) -> Vec<RoleId> {
        self.role_assignments
            .iter()
            .filter(|a| a.user == user && a.context == context)
            .map(|a| a.role)
            .collect()
    }

    fn roles(&self) -> Vec<Role> {
        self.roles.clone()
    }
}
