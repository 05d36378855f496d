//! Fixed element locators for the integration UI

use crate::webdriver::Locator;

pub fn user_field() -> Locator {
    Locator::css("#user_id")
}

pub fn password_field() -> Locator {
    Locator::css("#password")
}

pub fn sign_in_button() -> Locator {
    Locator::xpath("//button[normalize-space()='Sign in with Dimension']")
}

pub fn integrations_link() -> Locator {
    Locator::css("a[href='/integrations']")
}

pub fn identifier_field() -> Locator {
    Locator::css("input[placeholder='My Identifier']")
}

pub fn start_button() -> Locator {
    Locator::css("#runLiveBtn-0")
}

pub fn search_field() -> Locator {
    Locator::css("#name")
}

/// Link to a job, matched by the run id in its text
pub fn job_link(run_id: &str) -> Locator {
    Locator::link_containing(run_id)
}

pub fn status_header() -> Locator {
    Locator::css("h3.RunDetails_statusHeader__GhXHG")
}

pub fn page_size_select() -> Locator {
    Locator::xpath("//select[contains(@style, 'width: 50px')]")
}

/// Option of the page-size select, relative to the select
pub fn page_size_option(size: u32) -> Locator {
    Locator::xpath(format!(".//option[@value='{0}' or normalize-space()='{0}']", size))
}

pub fn results_table() -> Locator {
    Locator::css("#reactTable")
}

pub fn results_rows() -> Locator {
    Locator::css("#reactTable tbody tr")
}

pub fn row_cells() -> Locator {
    Locator::css("td")
}

pub fn pagination_info() -> Locator {
    Locator::xpath("//div[contains(text(), 'Showing items')]")
}

pub fn export_button() -> Locator {
    Locator::css("button[class*='ExportCsv_exportBtn__2UjzH']")
}

/// Result filters toggled before export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterBadge {
    Deleted,
    Errored,
    Warning,
}

impl FilterBadge {
    pub const ALL: [FilterBadge; 3] = [FilterBadge::Deleted, FilterBadge::Errored, FilterBadge::Warning];

    pub fn element_id(&self) -> &'static str {
        match self {
            FilterBadge::Deleted => "deletedBadge",
            FilterBadge::Errored => "erroredBadge",
            FilterBadge::Warning => "warningBadge",
        }
    }

    pub fn locator(&self) -> Locator {
        Locator::css(format!("span#{}", self.element_id()))
    }
}

impl std::fmt::Display for FilterBadge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterBadge::Deleted => write!(f, "Deleted"),
            FilterBadge::Errored => write!(f, "Errored"),
            FilterBadge::Warning => write!(f, "Warning"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_badge_locators() {
        let ids: Vec<&str> = FilterBadge::ALL.iter().map(|b| b.element_id()).collect();
        assert_eq!(ids, vec!["deletedBadge", "erroredBadge", "warningBadge"]);
        assert_eq!(FilterBadge::Warning.locator(), Locator::css("span#warningBadge"));
        assert_eq!(FilterBadge::Deleted.to_string(), "Deleted");
    }

    #[test]
    fn test_page_size_option() {
        assert_eq!(
            page_size_option(250),
            Locator::xpath(".//option[@value='250' or normalize-space()='250']")
        );
    }
}
