//! Per-department status catalog.
//!
//! Each department owns an ordered list of status codes. The first entry
//! (lowest position) must be the department's only `SET_ON_DUTY` status;
//! catalogs that break this are rejected when built, so the rest of the
//! engine can rely on it.

use std::collections::{BTreeMap, BTreeSet};

use dispatch_types::{DepartmentId, ShouldDo, StatusId, StatusValue};

/// Why a set of status values does not form a valid catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// Two entries share an id.
    #[error("duplicate status id {0}")]
    DuplicateId(StatusId),

    /// The first status of a department is not `SET_ON_DUTY`.
    #[error("department {0}: first status must be SET_ON_DUTY")]
    FirstNotOnDuty(DepartmentId),

    /// A department has more than one `SET_ON_DUTY` status.
    #[error("department {0}: more than one SET_ON_DUTY status")]
    DuplicateOnDuty(DepartmentId),

    /// Two statuses of one department share a position.
    #[error("department {department}: duplicate position {position}")]
    DuplicatePosition {
        /// The department.
        department: DepartmentId,
        /// The repeated position.
        position: u32,
    },
}

/// Validated, read-only status catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusCatalog {
    by_id: BTreeMap<StatusId, StatusValue>,
    by_department: BTreeMap<DepartmentId, Vec<StatusId>>,
}

impl StatusCatalog {
    /// Build a catalog, checking the on-duty rule for every department.
    ///
    /// # Errors
    ///
    /// Returns the first [`CatalogError`] found.
    pub fn new(values: Vec<StatusValue>) -> Result<Self, CatalogError> {
        let mut by_id = BTreeMap::new();
        let mut grouped: BTreeMap<DepartmentId, Vec<&StatusValue>> = BTreeMap::new();

        for value in values {
            let id = value.id;
            if by_id.insert(id, value).is_some() {
                return Err(CatalogError::DuplicateId(id));
            }
        }
        for value in by_id.values() {
            grouped.entry(value.department_id).or_default().push(value);
        }

        let mut by_department = BTreeMap::new();
        for (department, mut statuses) in grouped {
            statuses.sort_by_key(|s| s.position);

            let mut positions = BTreeSet::new();
            for status in &statuses {
                if !positions.insert(status.position) {
                    return Err(CatalogError::DuplicatePosition {
                        department,
                        position: status.position,
                    });
                }
            }

            let on_duty = statuses
                .iter()
                .filter(|s| s.should_do == ShouldDo::SetOnDuty)
                .count();
            if on_duty > 1 {
                return Err(CatalogError::DuplicateOnDuty(department));
            }
            if statuses
                .first()
                .is_none_or(|first| first.should_do != ShouldDo::SetOnDuty)
            {
                return Err(CatalogError::FirstNotOnDuty(department));
            }

            by_department.insert(department, statuses.iter().map(|s| s.id).collect());
        }

        Ok(Self {
            by_id,
            by_department,
        })
    }

    /// Statuses of one department, ordered by position.
    pub fn list(&self, department: DepartmentId) -> Vec<StatusValue> {
        self.by_department
            .get(&department)
            .map(|ids| ids.iter().filter_map(|id| self.by_id.get(id)).cloned().collect())
            .unwrap_or_default()
    }

    /// Every status, grouped by department and ordered by position.
    pub fn all(&self) -> Vec<StatusValue> {
        self.by_department
            .values()
            .flatten()
            .filter_map(|id| self.by_id.get(id))
            .cloned()
            .collect()
    }

    /// Look up a status by id.
    pub fn get(&self, id: StatusId) -> Option<&StatusValue> {
        self.by_id.get(&id)
    }

    /// The department's `SET_ON_DUTY` status.
    pub fn on_duty_status(&self, department: DepartmentId) -> Option<&StatusValue> {
        self.by_department
            .get(&department)
            .and_then(|ids| ids.first())
            .and_then(|id| self.by_id.get(id))
    }

    /// Effect of a status, if it exists.
    pub fn effect_of(&self, id: StatusId) -> Option<ShouldDo> {
        self.by_id.get(&id).map(|s| s.should_do)
    }

    /// Whether a unit holding `status` is on the active roster.
    ///
    /// `None` and `SET_OFF_DUTY` are off-roster; an id missing from the
    /// catalog is treated as off-roster too.
    pub fn is_on_roster(&self, status: Option<StatusId>) -> bool {
        status
            .and_then(|id| self.effect_of(id))
            .is_some_and(ShouldDo::is_on_roster)
    }

    /// Departments that have at least one status.
    pub fn departments(&self) -> impl Iterator<Item = DepartmentId> + '_ {
        self.by_department.keys().copied()
    }

    /// Departments whose status list differs between `self` and `other`.
    pub fn changed_departments(&self, other: &Self) -> BTreeSet<DepartmentId> {
        self.departments()
            .chain(other.departments())
            .filter(|dept| self.list(*dept) != other.list(*dept))
            .collect()
    }

    /// Number of statuses across all departments.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the catalog has no statuses.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn status(dept: DepartmentId, value: &str, should_do: ShouldDo, position: u32) -> StatusValue {
        StatusValue {
            id: StatusId::new(),
            value: value.into(),
            department_id: dept,
            should_do,
            position,
            color: None,
        }
    }

    #[test]
    fn lists_in_position_order() {
        let dept = DepartmentId::new();
        let off = status(dept, "10-7", ShouldDo::SetOffDuty, 2);
        let on = status(dept, "10-8", ShouldDo::SetOnDuty, 0);
        let stop = status(dept, "Traffic stop", ShouldDo::SetStatus, 1);
        let catalog = StatusCatalog::new(vec![off.clone(), on.clone(), stop.clone()]).unwrap();

        assert_eq!(catalog.list(dept), vec![on.clone(), stop, off.clone()]);
        assert_eq!(catalog.on_duty_status(dept), Some(&on));
        assert_eq!(catalog.effect_of(off.id), Some(ShouldDo::SetOffDuty));
        assert!(catalog.list(DepartmentId::new()).is_empty());
    }

    #[test]
    fn roster_membership_follows_effect() {
        let dept = DepartmentId::new();
        let on = status(dept, "10-8", ShouldDo::SetOnDuty, 0);
        let panic = status(dept, "Panic", ShouldDo::PanicButton, 1);
        let off = status(dept, "10-7", ShouldDo::SetOffDuty, 2);
        let catalog = StatusCatalog::new(vec![on.clone(), panic.clone(), off.clone()]).unwrap();

        assert!(catalog.is_on_roster(Some(on.id)));
        assert!(catalog.is_on_roster(Some(panic.id)));
        assert!(!catalog.is_on_roster(Some(off.id)));
        assert!(!catalog.is_on_roster(None));
        assert!(!catalog.is_on_roster(Some(StatusId::new())));
    }

    #[test]
    fn first_status_must_be_on_duty() {
        let dept = DepartmentId::new();
        let err = StatusCatalog::new(vec![
            status(dept, "Busy", ShouldDo::SetStatus, 0),
            status(dept, "10-8", ShouldDo::SetOnDuty, 1),
        ])
        .unwrap_err();
        assert_eq!(err, CatalogError::FirstNotOnDuty(dept));
    }

    #[test]
    fn on_duty_must_be_unique() {
        let dept = DepartmentId::new();
        let err = StatusCatalog::new(vec![
            status(dept, "10-8", ShouldDo::SetOnDuty, 0),
            status(dept, "10-41", ShouldDo::SetOnDuty, 1),
        ])
        .unwrap_err();
        assert_eq!(err, CatalogError::DuplicateOnDuty(dept));
    }

    #[test]
    fn changed_departments_detects_edits() {
        let pd = DepartmentId::new();
        let fd = DepartmentId::new();
        let pd_on = status(pd, "10-8", ShouldDo::SetOnDuty, 0);
        let fd_on = status(fd, "In service", ShouldDo::SetOnDuty, 0);
        let before = StatusCatalog::new(vec![pd_on.clone(), fd_on.clone()]).unwrap();

        let mut renamed = fd_on;
        renamed.value = "Available".into();
        let after = StatusCatalog::new(vec![pd_on, renamed]).unwrap();

        assert_eq!(
            before.changed_departments(&after),
            BTreeSet::from([fd])
        );
    }
}
