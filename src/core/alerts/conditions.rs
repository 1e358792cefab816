// Display conditions listing for administration views.

use chrono::{TimeZone, Utc};

use super::filters::FilterAdapter;
use super::model::{Alert, FilterName, RoleSet};
use crate::core::config::PageTypes;
use crate::core::directory::{Directory, Role};

const DATE_FORMAT: &str = "%d %B %Y, %H:%M";

/// Describe every condition that restricts where and to whom `alert` is
/// shown, one line per condition.
pub fn describe_conditions(alert: &Alert, page_types: &PageTypes, directory: &dyn Directory) -> Vec<String> {
    let mut items = Vec::new();

    if !alert.pagetype.is_empty() {
        let label = page_types
            .label(&alert.pagetype)
            .unwrap_or_else(|| alert.pagetype.clone());
        items.push(format!("Pagetype: {}", label));
    }

    for name in [
        FilterName::UserProfileField,
        FilterName::CourseCustomField,
        FilterName::Institution,
        FilterName::Department,
        FilterName::Cohort,
    ] {
        let (Some(spec), Some(adapter)) = (alert.filters.active_spec(name), FilterAdapter::for_filter(name)) else {
            continue;
        };
        let label = adapter.get_label(spec, directory);
        if !label.is_empty() {
            items.push(label);
        }
    }

    let roles = directory.roles();
    for (title, wanted) in [
        ("Course roles", &alert.filters.roles_in_course),
        ("System roles", &alert.filters.roles_in_system),
    ] {
        if let Some(names) = role_names(wanted, &roles) {
            items.push(format!("{}: {}", title, names));
        }
    }

    if let Some(from) = alert.starts_at().and_then(format_time) {
        items.push(format!("Display from: {}", from));
    }
    if let Some(to) = alert.ends_at().and_then(format_time) {
        items.push(format!("Display to: {}", to));
    }

    items
}

/// Names of the known roles in `wanted`, `None` when none resolve.
fn role_names(wanted: &RoleSet, roles: &[Role]) -> Option<String> {
    let names: Vec<&str> = wanted
        .iter()
        .filter_map(|id| roles.iter().find(|r| r.id == id))
        .map(Role::display_name)
        .collect();
    if names.is_empty() {
        None
    } else {
        Some(names.join(", "))
    }
}

fn format_time(timestamp: i64) -> Option<String> {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .map(|dt| dt.format(DATE_FORMAT).to_string())
}
