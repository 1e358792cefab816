// Visibility rules: decides whether an alert may be shown on a page.
//
// Checks run in a fixed order and the first failing one hides the alert:
// enabled flag, page type, display window, then each active filter.

use std::borrow::Cow;

use chrono::Utc;

use super::filters::FilterAdapter;
use super::model::{Alert, CourseId, FilterName, RoleSet, UserId};
use crate::core::config::PageTypes;
use crate::core::directory::{Directory, PageContext};

const PAGE_PREFIX: &str = "page-";
const COURSE_VIEW_PAGE: &str = "page-course-view";

/// The page being rendered and who it is rendered for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Page identifier, with or without the `page-` prefix.
    pub page_type: String,
    /// Used for role lookups.
    pub context: PageContext,
    /// 0 outside of a course.
    pub course_id: CourseId,
    pub user_id: UserId,
    /// Unix seconds the display window is checked against.
    pub now: i64,
}

impl PageRequest {
    pub fn new(
        page_type: impl Into<String>,
        context: PageContext,
        course_id: CourseId,
        user_id: UserId,
    ) -> Self {
        Self {
            page_type: page_type.into(),
            context,
            course_id,
            user_id,
            now: Utc::now().timestamp(),
        }
    }

    /// Evaluate as of `now` instead of the wall clock.
    pub fn at(mut self, now: i64) -> Self {
        self.now = now;
        self
    }

    /// The page type, always carrying the `page-` prefix.
    pub fn normalized_page_type(&self) -> Cow<'_, str> {
        if self.page_type.starts_with(PAGE_PREFIX) {
            Cow::Borrowed(&self.page_type)
        } else {
            Cow::Owned(format!("{PAGE_PREFIX}{}", self.page_type))
        }
    }
}

pub struct Evaluator<'a> {
    page_types: &'a PageTypes,
    directory: &'a dyn Directory,
}

impl<'a> Evaluator<'a> {
    pub fn new(page_types: &'a PageTypes, directory: &'a dyn Directory) -> Self {
        Self {
            page_types,
            directory,
        }
    }

    /// Can `alert` be displayed for `request`?
    ///
    /// Never fails: filters that cannot be evaluated hide the alert.
    pub fn can_display(&self, alert: &Alert, request: &PageRequest) -> bool {
        let page_type = request.normalized_page_type();

        if !alert.enabled {
            log::debug!("Alert {} hidden: disabled", alert.id);
            return false;
        }
        if !self.page_type_allows(alert, &page_type) {
            log::debug!("Alert {} hidden: page type {:?} on {}", alert.id, alert.pagetype, page_type);
            return false;
        }
        if !within_window(alert, request.now) {
            log::debug!("Alert {} hidden: outside display window", alert.id);
            return false;
        }

        for name in FilterName::all() {
            if !self.filter_passes(alert, *name, &page_type, request) {
                log::debug!("Alert {} hidden: {} filter", alert.id, name.key());
                return false;
            }
        }
        true
    }

    /// An empty page type never passes: it is not in the configured set.
    fn page_type_allows(&self, alert: &Alert, page_type: &str) -> bool {
        if !alert.pagetype.is_empty() && alert.pagetype != page_type {
            return false;
        }
        self.page_types.contains(&alert.pagetype)
    }

    fn filter_passes(&self, alert: &Alert, name: FilterName, page_type: &str, request: &PageRequest) -> bool {
        match name {
            FilterName::RolesInCourse => {
                let held = self.directory.user_roles(request.user_id, request.context, true);
                roles_pass(&alert.filters.roles_in_course, held.iter())
            }
            FilterName::RolesInSystem => {
                let held = self.directory.user_roles(request.user_id, PageContext::System, false);
                roles_pass(&alert.filters.roles_in_system, held.iter())
            }
            FilterName::CourseCustomField => {
                if alert.filters.active_spec(name).is_some() && !page_type.contains(COURSE_VIEW_PAGE) {
                    return false;
                }
                self.adapter_passes(alert, name, request.course_id)
            }
            FilterName::UserProfileField
            | FilterName::Department
            | FilterName::Institution
            | FilterName::Cohort => self.adapter_passes(alert, name, request.user_id),
        }
    }

    /// Inactive filters pass. Active ones must build a predicate that
    /// selects `id`.
    fn adapter_passes(&self, alert: &Alert, name: FilterName, id: u64) -> bool {
        let Some(spec) = alert.filters.active_spec(name) else {
            return true;
        };
        let Some(adapter) = FilterAdapter::for_filter(name) else {
            return true;
        };
        match adapter.build_predicate(spec, self.directory) {
            Some(predicate) => predicate.select([id], self.directory).contains(&id),
            None => false,
        }
    }
}

fn roles_pass<'r>(wanted: &RoleSet, held: impl IntoIterator<Item = &'r u64>) -> bool {
    !wanted.is_active() || wanted.intersects(held)
}

/// Both ends of the window are inclusive; unset ends are open.
fn within_window(alert: &Alert, now: i64) -> bool {
    if alert.starts_at().is_some_and(|from| from > now) {
        return false;
    }
    if alert.ends_at().is_some_and(|to| to < now) {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::model::{FieldRef, FilterSpec, Operator};
    use crate::core::directory::MemoryDirectory;

    const NOW: i64 = 1_760_000_000;

    fn page_types() -> PageTypes {
        PageTypes::parse("page-my-index\npage-course-view\npage-mod-assign-view")
    }

    fn request(page: &str) -> PageRequest {
        PageRequest::new(page, PageContext::System, 0, 1).at(NOW)
    }

    #[test]
    fn test_page_type_normalization() {
        assert_eq!(request("my-index").normalized_page_type(), "page-my-index");
        assert_eq!(request("page-my-index").normalized_page_type(), "page-my-index");
    }

    #[test]
    fn test_disabled_alert_never_displays() {
        let dir = MemoryDirectory::new();
        let types = page_types();
        let evaluator = Evaluator::new(&types, &dir);

        let mut alert = Alert::new("page-my-index");
        assert!(evaluator.can_display(&alert, &request("my-index")));

        alert.enabled = false;
        assert!(!evaluator.can_display(&alert, &request("my-index")));
    }

    #[test]
    fn test_page_type_must_match_and_be_configured() {
        let dir = MemoryDirectory::new();
        let types = page_types();
        let evaluator = Evaluator::new(&types, &dir);

        let alert = Alert::new("page-my-index");
        assert!(!evaluator.can_display(&alert, &request("page-course-view")));

        let unconfigured = Alert::new("page-frontpage");
        assert!(!evaluator.can_display(&unconfigured, &request("page-frontpage")));

        let unrestricted = Alert::new("");
        assert!(!evaluator.can_display(&unrestricted, &request("page-my-index")));
    }

    #[test]
    fn test_display_window_is_inclusive() {
        let dir = MemoryDirectory::new();
        let types = page_types();
        let evaluator = Evaluator::new(&types, &dir);

        let mut alert = Alert::new("page-my-index");
        alert.display_from = Some(NOW);
        alert.display_to = Some(NOW);
        assert!(evaluator.can_display(&alert, &request("my-index")));

        alert.display_from = Some(NOW + 1);
        assert!(!evaluator.can_display(&alert, &request("my-index")));

        alert.display_from = Some(0);
        alert.display_to = Some(NOW - 1);
        assert!(!evaluator.can_display(&alert, &request("my-index")));

        alert.display_to = Some(0);
        assert!(evaluator.can_display(&alert, &request("my-index")));
    }

    #[test]
    fn test_course_field_requires_course_view_page() {
        let dir = MemoryDirectory::new()
            .with_course_field(1, "type", "Type", "")
            .with_course_value(5, 1, "Module");
        let types = page_types();
        let evaluator = Evaluator::new(&types, &dir);

        let mut alert = Alert::new("page-mod-assign-view");
        alert.filters.course_custom_field =
            Some(FilterSpec::field(FieldRef::Id(1), Operator::Contains, "module"));

        let req = PageRequest::new("mod-assign-view", PageContext::Course(5), 5, 1).at(NOW);
        assert!(!evaluator.can_display(&alert, &req));
    }

    #[test]
    fn test_inactive_filters_are_skipped() {
        let dir = MemoryDirectory::new();
        let types = page_types();
        let evaluator = Evaluator::new(&types, &dir);

        let mut alert = Alert::new("page-my-index");
        alert.filters.department = Some(FilterSpec::text(Operator::Contains, ""));
        alert.filters.course_custom_field = Some(FilterSpec::field(FieldRef::Id(9), Operator::Contains, ""));
        assert!(evaluator.can_display(&alert, &request("my-index")));
    }

    #[test]
    fn test_unbuildable_filter_hides_alert() {
        let dir = MemoryDirectory::new().with_user(1, "student", "");
        let types = page_types();
        let evaluator = Evaluator::new(&types, &dir);

        let mut alert = Alert::new("page-my-index");
        alert.filters.user_profile_field = Some(FilterSpec::field(FieldRef::Id(404), Operator::Contains, "x"));
        assert!(!evaluator.can_display(&alert, &request("my-index")));

        let mut alert = Alert::new("page-my-index");
        alert.filters.department = Some(FilterSpec::text(Operator::IsDefined, "x"));
        assert!(!evaluator.can_display(&alert, &request("my-index")));
    }

    #[test]
    fn test_system_roles_are_not_inherited_downwards() {
        let dir = MemoryDirectory::new()
            .with_assignment(1, 5, PageContext::Course(3))
            .with_assignment(1, 9, PageContext::System);
        let types = page_types();
        let evaluator = Evaluator::new(&types, &dir);
        let req = PageRequest::new("course-view", PageContext::Course(3), 3, 1).at(NOW);

        let mut alert = Alert::new("page-course-view");
        alert.filters.roles_in_system = RoleSet::parse("5");
        assert!(!evaluator.can_display(&alert, &req));

        alert.filters.roles_in_system = RoleSet::parse("9");
        assert!(evaluator.can_display(&alert, &req));

        // Course roles see system assignments through the parent chain.
        alert.filters.roles_in_course = RoleSet::parse("9");
        assert!(evaluator.can_display(&alert, &req));
    }

    #[test]
    fn test_role_filter_without_valid_ids_hides_alert() {
        let dir = MemoryDirectory::new().with_assignment(1, 5, PageContext::Course(3));
        let types = page_types();
        let evaluator = Evaluator::new(&types, &dir);
        let req = PageRequest::new("course-view", PageContext::Course(3), 3, 1).at(NOW);

        for raw in ["editingteacher", ","] {
            let mut alert = Alert::new("page-course-view");
            alert.filters.roles_in_course = RoleSet::parse(raw);
            assert!(!evaluator.can_display(&alert, &req), "role filter {:?}", raw);

            let mut alert = Alert::new("page-course-view");
            alert.filters.roles_in_system = RoleSet::parse(raw);
            assert!(!evaluator.can_display(&alert, &req), "role filter {:?}", raw);
        }

        let mut alert = Alert::new("page-course-view");
        alert.filters.roles_in_course = RoleSet::parse("  ");
        assert!(evaluator.can_display(&alert, &req));
    }

    #[test]
    fn test_unset_field_filters_from_form_still_display() {
        let dir = MemoryDirectory::new().with_user(1, "student", "");
        let types = page_types();
        let evaluator = Evaluator::new(&types, &dir);

        let raw = r#"{
            "id": 3,
            "pagetype": "page-my-index",
            "enabled": "1",
            "filters": "{\"coursecustomfield\":{\"op\":null,\"fld\":null,\"value\":null},\"userprofilefield\":{\"op\":\"\",\"fld\":\"\",\"value\":\"\"},\"rolesincourse\":\"\",\"rolesinsystem\":\"\",\"department\":{\"op\":\"0\",\"value\":\"\"}}"
        }"#;
        let alert: Alert = serde_json::from_str(raw).unwrap();
        assert!(evaluator.can_display(&alert, &request("my-index")));
    }

    #[test]
    fn test_repeated_evaluation_is_stable() {
        let dir = MemoryDirectory::new().with_user(1, "student", "");
        let types = page_types();
        let evaluator = Evaluator::new(&types, &dir);

        let mut alert = Alert::new("page-my-index");
        alert.filters.department = Some(FilterSpec::text(Operator::StartsWith, "stu"));
        let req = request("my-index");
        let first = evaluator.can_display(&alert, &req);
        assert!(first);
        for _ in 0..5 {
            assert_eq!(evaluator.can_display(&alert, &req), first);
        }
    }
}
