//! New-release detection against the per-project marker.

use relwatch_core::types::Release;

/// What a fetched page means for a project, given its marker.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// Nothing to notify.
    UpToDate,
    /// First sighting of this project. The caller records the page as
    /// history and sets the marker to the newest tag without notifying.
    Bootstrap { baseline: String },
    /// Releases published since the marker, oldest-first.
    New { releases: Vec<Release> },
    /// The marker was not found in the page: it scrolled past the fetch
    /// window or the release was deleted. The whole page is treated as new,
    /// oldest-first.
    Gap { releases: Vec<Release> },
}

/// Walk a newest-first page and split off everything above the marker.
///
/// The marker tag is compared exactly. Notifications come out oldest-first
/// so subscribers read them in publication order.
pub fn detect_new(marker: Option<&str>, fetched: &[Release]) -> Detection {
    let Some(newest) = fetched.first() else {
        return Detection::UpToDate;
    };
    let Some(marker) = marker else {
        return Detection::Bootstrap {
            baseline: newest.tag.clone(),
        };
    };

    let mut ahead: Vec<Release> = Vec::new();
    for release in fetched {
        if release.tag == marker {
            if ahead.is_empty() {
                return Detection::UpToDate;
            }
            ahead.reverse();
            return Detection::New { releases: ahead };
        }
        ahead.push(release.clone());
    }

    ahead.reverse();
    Detection::Gap { releases: ahead }
}
