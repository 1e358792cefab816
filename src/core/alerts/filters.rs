// Filter adapters: turn a stored `FilterSpec` into a predicate over users or
// courses, and into a label for listings.
//
// Value operators follow SQL LIKE semantics: case-insensitive, `%` and `_`
// wildcards, `\` escape.

use std::collections::BTreeSet;

use regex::{Regex, RegexBuilder};

use super::model::{CohortId, FieldRef, FilterName, FilterSpec, Operator};
use crate::core::directory::{Directory, FieldDefinition, UserAttribute};

/// Label used for "any field" references.
const ANY_FIELD: &str = "any field";

/// The adapters backing each named filter. Role filters are plain set
/// intersections and have no adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAdapter {
    CourseCustomField,
    UserProfileField,
    Text(UserAttribute),
    Cohort,
}

impl FilterAdapter {
    pub fn for_filter(name: FilterName) -> Option<Self> {
        match name {
            FilterName::CourseCustomField => Some(Self::CourseCustomField),
            FilterName::UserProfileField => Some(Self::UserProfileField),
            FilterName::Department => Some(Self::Text(UserAttribute::Department)),
            FilterName::Institution => Some(Self::Text(UserAttribute::Institution)),
            FilterName::Cohort => Some(Self::Cohort),
            FilterName::RolesInCourse | FilterName::RolesInSystem => None,
        }
    }

    /// Heading shown in front of the filter in listings.
    pub fn title(self) -> &'static str {
        match self {
            Self::CourseCustomField => "Course field",
            Self::UserProfileField => "Profile fields",
            Self::Text(attribute) => attribute.display_name(),
            Self::Cohort => "Cohort",
        }
    }

    /// Operators this adapter understands.
    pub fn supports(self, operator: Operator) -> bool {
        match self {
            Self::CourseCustomField | Self::UserProfileField | Self::Cohort => true,
            Self::Text(_) => operator.code() <= Operator::IsEmpty.code(),
        }
    }

    /// Compile `spec` into a predicate. `None` means nothing can match: the
    /// field no longer exists, the operator needs a value and has none, or
    /// the cohort cannot be found.
    pub fn build_predicate(self, spec: &FilterSpec, directory: &dyn Directory) -> Option<Predicate> {
        if !self.supports(spec.operator) {
            log::debug!("{} filter does not support {:?}", self.title(), spec.operator);
            return None;
        }
        if spec.operator.requires_value() && spec.value.is_empty() && self != Self::Cohort {
            return None;
        }

        let scope = match self {
            Self::CourseCustomField | Self::UserProfileField => {
                let field = spec.field?;
                if let FieldRef::Id(id) = field {
                    if self.field_definition(id, directory).is_none() {
                        log::warn!("{} filter references unknown field {}", self.title(), id);
                        return None;
                    }
                }
                if self == Self::CourseCustomField {
                    Scope::CourseData(field)
                } else {
                    Scope::UserData(field)
                }
            }
            Self::Text(attribute) => Scope::Attribute(attribute),
            Self::Cohort => {
                let cohorts = resolve_cohorts(&spec.value, directory);
                if cohorts.is_empty() {
                    log::debug!("No cohort matches {:?}", spec.value);
                    return None;
                }
                return Some(Predicate {
                    scope: Scope::Cohorts(cohorts),
                    test: Test::Defined,
                });
            }
        };

        Some(Predicate {
            scope,
            test: Test::compile(spec.operator, &spec.value)?,
        })
    }

    /// Human readable description, empty when the spec cannot be described
    /// (unknown field or unsupported operator).
    pub fn get_label(self, spec: &FilterSpec, directory: &dyn Directory) -> String {
        if !self.supports(spec.operator) {
            return String::new();
        }
        let operator = spec.operator.display_name();

        let subject = match self {
            Self::Cohort => return format!("Cohort is '{}'", spec.value),
            Self::Text(attribute) => attribute.display_name().to_string(),
            Self::CourseCustomField | Self::UserProfileField => {
                let field_name = match spec.field {
                    None => return String::new(),
                    Some(FieldRef::Any) => ANY_FIELD.to_string(),
                    Some(FieldRef::Id(id)) => match self.field_definition(id, directory) {
                        Some(field) => self.field_label(&field),
                        None => return String::new(),
                    },
                };
                format!("{}: {}", self.title(), field_name)
            }
        };

        if spec.operator.requires_value() {
            format!("{} {} '{}'", subject, operator, spec.value)
        } else {
            format!("{} {}", subject, operator)
        }
    }

    fn field_definition(self, id: u64, directory: &dyn Directory) -> Option<FieldDefinition> {
        match self {
            Self::CourseCustomField => directory.course_field(id),
            Self::UserProfileField => directory.user_field(id),
            Self::Text(_) | Self::Cohort => None,
        }
    }

    fn field_label(self, field: &FieldDefinition) -> String {
        if self == Self::CourseCustomField && !field.category.is_empty() {
            format!("{}: {}", field.category, field.name)
        } else {
            field.name.clone()
        }
    }
}

/// Cohorts named by `value`: by id number, name, or numeric id.
fn resolve_cohorts(value: &str, directory: &dyn Directory) -> Vec<CohortId> {
    let wanted = value.trim();
    if wanted.is_empty() {
        return Vec::new();
    }
    directory
        .cohorts()
        .into_iter()
        .filter(|c| {
            c.idnumber.eq_ignore_ascii_case(wanted)
                || c.name.eq_ignore_ascii_case(wanted)
                || c.id.to_string() == wanted
        })
        .map(|c| c.id)
        .collect()
}

#[derive(Debug, Clone)]
enum Scope {
    CourseData(FieldRef),
    UserData(FieldRef),
    Attribute(UserAttribute),
    Cohorts(Vec<CohortId>),
}

#[derive(Debug, Clone)]
enum Test {
    Like { pattern: Regex, negated: bool },
    Equals(String),
    Defined,
    NotDefined,
}

impl Test {
    fn compile(operator: Operator, value: &str) -> Option<Self> {
        let like = |pattern: String, negated: bool| {
            like_regex(&pattern).map(|pattern| Self::Like { pattern, negated })
        };
        match operator {
            Operator::Contains => like(format!("%{value}%"), false),
            Operator::DoesNotContain => like(format!("%{value}%"), true),
            Operator::EqualTo => like(value.to_string(), false),
            Operator::StartsWith => like(format!("{value}%"), false),
            Operator::EndsWith => like(format!("%{value}"), false),
            Operator::IsEmpty => Some(Self::Equals(String::new())),
            Operator::IsNotDefined => Some(Self::NotDefined),
            Operator::IsDefined => Some(Self::Defined),
        }
    }

    fn matches_value(&self, value: &str) -> bool {
        match self {
            Self::Like { pattern, negated } => pattern.is_match(value) != *negated,
            Self::Equals(expected) => value == expected,
            Self::Defined => true,
            Self::NotDefined => false,
        }
    }
}

/// Translate a LIKE pattern into an anchored, case-insensitive regex.
fn like_regex(pattern: &str) -> Option<Regex> {
    let mut source = String::from("^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            '\\' => {
                let literal = chars.next().unwrap_or('\\');
                source.push_str(&regex::escape(&literal.to_string()));
            }
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');

    RegexBuilder::new(&source)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| log::warn!("Unable to compile filter pattern {:?}: {}", pattern, e))
        .ok()
}

/// A compiled filter. Selects the ids of matching users or courses.
#[derive(Debug, Clone)]
pub struct Predicate {
    scope: Scope,
    test: Test,
}

impl Predicate {
    pub fn matches(&self, id: u64, directory: &dyn Directory) -> bool {
        // Id 0 is "no course" / "no user" and never exists.
        if id == 0 {
            return false;
        }
        match &self.scope {
            Scope::CourseData(field) => self.matches_data(*field, directory.course_field_data(id)),
            Scope::UserData(field) => self.matches_data(*field, directory.user_field_data(id)),
            Scope::Attribute(attribute) => directory
                .user_attribute(id, *attribute)
                .is_some_and(|value| self.test.matches_value(&value)),
            Scope::Cohorts(cohorts) => cohorts.iter().any(|c| directory.is_cohort_member(*c, id)),
        }
    }

    /// The subset of `candidates` this predicate matches.
    pub fn select(
        &self,
        candidates: impl IntoIterator<Item = u64>,
        directory: &dyn Directory,
    ) -> BTreeSet<u64> {
        candidates
            .into_iter()
            .filter(|id| self.matches(*id, directory))
            .collect()
    }

    fn matches_data(&self, field: FieldRef, data: Vec<(u64, String)>) -> bool {
        let mut values = data
            .into_iter()
            .filter(|(id, _)| field == FieldRef::Any || field == FieldRef::Id(*id))
            .map(|(_, value)| value);

        match &self.test {
            Test::NotDefined => values.next().is_none(),
            test => values.any(|value| test.matches_value(&value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::directory::MemoryDirectory;

    fn directory() -> MemoryDirectory {
        MemoryDirectory::new()
            .with_course_field(1, "type", "Course type", "Academic")
            .with_course_field(2, "faculty", "Faculty", "Academic")
            .with_course_value(10, 1, "Module")
            .with_course_value(11, 1, "Course page")
            .with_course_value(11, 2, "")
            .with_user_field(3, "studentno", "Student number")
            .with_user_value(100, 3, "S1234")
            .with_user(100, "Student Services", "Solent")
            .with_user(101, "staff", "")
            .with_cohort(7, "year1", "Year One", &[100])
    }

    fn select(adapter: FilterAdapter, spec: FilterSpec, ids: &[u64]) -> Option<Vec<u64>> {
        let dir = directory();
        adapter
            .build_predicate(&spec, &dir)
            .map(|p| p.select(ids.iter().copied(), &dir).into_iter().collect())
    }

    #[test]
    fn test_course_field_operators() {
        let course = |op, value: &str| {
            select(
                FilterAdapter::CourseCustomField,
                FilterSpec::field(FieldRef::Id(1), op, value),
                &[10, 11, 12],
            )
        };

        assert_eq!(course(Operator::Contains, "MOD"), Some(vec![10]));
        assert_eq!(course(Operator::DoesNotContain, "mod"), Some(vec![11]));
        assert_eq!(course(Operator::EqualTo, "module"), Some(vec![10]));
        assert_eq!(course(Operator::EqualTo, "mod"), Some(vec![]));
        assert_eq!(course(Operator::StartsWith, "course"), Some(vec![11]));
        assert_eq!(course(Operator::EndsWith, "ULE"), Some(vec![10]));
        assert_eq!(course(Operator::IsDefined, "x"), Some(vec![10, 11]));
        assert_eq!(course(Operator::IsNotDefined, "x"), Some(vec![12]));
    }

    #[test]
    fn test_is_empty_requires_stored_empty_string() {
        let result = select(
            FilterAdapter::CourseCustomField,
            FilterSpec::field(FieldRef::Id(2), Operator::IsEmpty, "x"),
            &[10, 11],
        );
        assert_eq!(result, Some(vec![11]));
    }

    #[test]
    fn test_any_field_reference() {
        let any = |op| {
            select(
                FilterAdapter::CourseCustomField,
                FilterSpec::field(FieldRef::Any, op, "page"),
                &[10, 11, 12],
            )
        };
        assert_eq!(any(Operator::Contains), Some(vec![11]));
        assert_eq!(any(Operator::IsDefined), Some(vec![10, 11]));
        assert_eq!(any(Operator::IsNotDefined), Some(vec![12]));
    }

    #[test]
    fn test_unknown_field_has_no_predicate() {
        let dir = directory();
        let spec = FilterSpec::field(FieldRef::Id(99), Operator::Contains, "x");
        assert!(FilterAdapter::CourseCustomField.build_predicate(&spec, &dir).is_none());

        let spec = FilterSpec::text(Operator::Contains, "x");
        assert!(FilterAdapter::UserProfileField.build_predicate(&spec, &dir).is_none());
    }

    #[test]
    fn test_missing_value_has_no_predicate() {
        let dir = directory();
        for op in [Operator::Contains, Operator::EqualTo, Operator::EndsWith] {
            let spec = FilterSpec::field(FieldRef::Id(3), op, "");
            assert!(FilterAdapter::UserProfileField.build_predicate(&spec, &dir).is_none());
        }
        let spec = FilterSpec::field(FieldRef::Id(3), Operator::IsDefined, "");
        assert!(FilterAdapter::UserProfileField.build_predicate(&spec, &dir).is_some());
    }

    #[test]
    fn test_does_not_contain_needs_a_stored_value() {
        let result = select(
            FilterAdapter::UserProfileField,
            FilterSpec::field(FieldRef::Id(3), Operator::DoesNotContain, "X"),
            &[100, 101],
        );
        assert_eq!(result, Some(vec![100]));
    }

    #[test]
    fn test_like_wildcards_pass_through() {
        let result = select(
            FilterAdapter::UserProfileField,
            FilterSpec::field(FieldRef::Id(3), Operator::EqualTo, "s1_3%"),
            &[100],
        );
        assert_eq!(result, Some(vec![100]));

        let re = like_regex(r"50\%").unwrap();
        assert!(re.is_match("50%"));
        assert!(!re.is_match("500"));
    }

    #[test]
    fn test_text_attribute() {
        let dept = FilterAdapter::Text(UserAttribute::Department);
        assert_eq!(
            select(dept, FilterSpec::text(Operator::Contains, "student"), &[100, 101, 102]),
            Some(vec![100])
        );
        let inst = FilterAdapter::Text(UserAttribute::Institution);
        assert_eq!(
            select(inst, FilterSpec::text(Operator::IsEmpty, "x"), &[100, 101, 102]),
            Some(vec![101])
        );
        assert_eq!(select(inst, FilterSpec::text(Operator::IsDefined, "x"), &[100]), None);
    }

    #[test]
    fn test_cohort_membership_ignores_operator() {
        for op in [Operator::Contains, Operator::DoesNotContain, Operator::IsEmpty] {
            assert_eq!(
                select(FilterAdapter::Cohort, FilterSpec::text(op, "YEAR1"), &[100, 101]),
                Some(vec![100])
            );
        }
        assert_eq!(
            select(FilterAdapter::Cohort, FilterSpec::text(Operator::Contains, "7"), &[100]),
            Some(vec![100])
        );
        assert_eq!(
            select(FilterAdapter::Cohort, FilterSpec::text(Operator::Contains, "year2"), &[100]),
            None
        );
    }

    #[test]
    fn test_zero_id_never_matches() {
        assert_eq!(
            select(
                FilterAdapter::CourseCustomField,
                FilterSpec::field(FieldRef::Id(1), Operator::IsNotDefined, "x"),
                &[0],
            ),
            Some(vec![])
        );
    }

    #[test]
    fn test_labels() {
        let dir = directory();
        let label = |adapter: FilterAdapter, spec| adapter.get_label(&spec, &dir);

        assert_eq!(
            label(FilterAdapter::Text(UserAttribute::Department), FilterSpec::text(Operator::Contains, "student")),
            "Department contains 'student'"
        );
        assert_eq!(
            label(
                FilterAdapter::CourseCustomField,
                FilterSpec::field(FieldRef::Id(1), Operator::StartsWith, "mod")
            ),
            "Course field: Academic: Course type starts with 'mod'"
        );
        assert_eq!(
            label(
                FilterAdapter::UserProfileField,
                FilterSpec::field(FieldRef::Any, Operator::IsNotDefined, "x")
            ),
            "Profile fields: any field is not defined"
        );
        assert_eq!(
            label(FilterAdapter::Cohort, FilterSpec::text(Operator::Contains, "year1")),
            "Cohort is 'year1'"
        );
        assert!(label(
            FilterAdapter::UserProfileField,
            FilterSpec::field(FieldRef::Id(42), Operator::Contains, "x")
        )
        .is_empty());
        assert!(label(
            FilterAdapter::Text(UserAttribute::Institution),
            FilterSpec::text(Operator::IsDefined, "x")
        )
        .is_empty());
    }
}
