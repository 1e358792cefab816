// Alert engine - picks the alerts and notices to render on a page.

use serde::{Deserialize, Serialize};

use super::evaluator::{Evaluator, PageRequest};
use super::model::{Alert, AlertId, AlertType, ContentType};
use crate::core::config::{PageTypes, Settings};
use crate::core::directory::Directory;

/// An alert rendered as a notification box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: AlertId,
    pub content: String,
    pub alert_type: AlertType,
}

/// Everything to render for one page request, in display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Displayed {
    pub alerts: Vec<Notification>,
    pub notices: Vec<String>,
}

impl Displayed {
    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty() && self.notices.is_empty()
    }
}

/// Alert engine state
pub struct AlertEngine {
    page_types: PageTypes,
}

impl AlertEngine {
    pub fn new(settings: &Settings) -> Self {
        Self {
            page_types: settings.page_types(),
        }
    }

    /// Update the engine configuration (hot-reload friendly)
    pub fn update_config(&mut self, settings: &Settings) {
        self.page_types = settings.page_types();
    }

    /// Collect the displayable alerts and notices for `request`.
    ///
    /// Only enabled records are considered, each group ordered by sort order
    /// (ties keep store order). Banners are not rendered here.
    pub fn collect(&self, alerts: &[Alert], request: &PageRequest, directory: &dyn Directory) -> Displayed {
        let evaluator = Evaluator::new(&self.page_types, directory);
        let mut displayed = Displayed::default();

        for alert in self.candidates(alerts, ContentType::Alert) {
            if evaluator.can_display(alert, request) {
                displayed.alerts.push(Notification {
                    id: alert.id,
                    content: alert.content.clone(),
                    alert_type: alert.alert_type,
                });
            }
        }

        for alert in self.candidates(alerts, ContentType::Notice) {
            if evaluator.can_display(alert, request) {
                displayed.notices.push(alert.content.clone());
            }
        }

        log::debug!(
            "{} alerts and {} notices displayed on {}",
            displayed.alerts.len(),
            displayed.notices.len(),
            request.normalized_page_type()
        );
        displayed
    }

    fn candidates<'a>(&self, alerts: &'a [Alert], content_type: ContentType) -> Vec<&'a Alert> {
        let mut candidates: Vec<&Alert> = alerts
            .iter()
            .filter(|a| a.enabled && a.content_type == content_type)
            .collect();
        candidates.sort_by_key(|a| a.sort_order);
        candidates
    }
}
