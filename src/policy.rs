use crate::error::{AppError, AppResult};

pub const ADMINS_GROUP: &str = "Admins";
pub const MODERATORS_GROUP: &str = "Moderators";
pub const USERS_GROUP: &str = "Users";

/// The authenticated identity behind a request, resolved once at the HTTP
/// boundary and passed explicitly into every policy and gateway call.
#[derive(Clone, Debug)]
pub struct Actor {
    pub id: i32,
    pub username: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub groups: Vec<String>,
}

impl Actor {
    pub fn is_moderator(&self) -> bool {
        self.is_superuser || self.groups.iter().any(|g| g == MODERATORS_GROUP)
    }
}

/// One variant per resource x action the application knows about.
/// Variants carry target ownership where the rule depends on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    CreateUser,
    ListUsers,
    ReadUser { target: i32 },
    UpdateUser { target: i32 },
    DeleteUser,
    ReadProfile { target: i32 },
    ListGroups,
    ReadGroup,
    MutateGroup,
    CreateReview,
    EditReview { author: i32 },
    DeleteReview { author: i32 },
    RateMovie,
    ToggleFavorite,
    Moderate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(Deny),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Deny {
    Unauthenticated,
    Forbidden,
}

/// The decision table. Pure: no I/O, no side effects, first match wins.
///
/// Registration is the only action open to anonymous callers. For
/// everything else a missing actor is `Unauthenticated`; an actor the
/// table rejects is `Forbidden`. Result-set scoping (which groups or
/// users a caller may see inside an allowed listing) belongs to the
/// gateway, not here.
pub fn decide(actor: Option<&Actor>, action: Action) -> Decision {
    if action == Action::CreateUser {
        return Decision::Allow;
    }
    let Some(actor) = actor else {
        return Decision::Deny(Deny::Unauthenticated);
    };

    let allowed = match action {
        Action::CreateUser => true,
        Action::ListUsers => actor.is_staff,
        Action::ReadUser { target } | Action::UpdateUser { target } => {
            target == actor.id || actor.is_staff
        }
        // A plain user may never delete their own record; deletion is
        // staff-only regardless of target.
        Action::DeleteUser => actor.is_staff,
        Action::ReadProfile { target } => target == actor.id || actor.is_moderator(),
        Action::ListGroups | Action::ReadGroup => true,
        Action::MutateGroup => actor.is_staff,
        Action::CreateReview | Action::RateMovie | Action::ToggleFavorite => true,
        Action::EditReview { author } | Action::DeleteReview { author } => {
            author == actor.id || actor.is_moderator()
        }
        Action::Moderate => actor.is_moderator(),
    };

    if allowed { Decision::Allow } else { Decision::Deny(Deny::Forbidden) }
}

/// `decide` mapped onto the error taxonomy, for gateway call sites.
pub fn check(actor: Option<&Actor>, action: Action) -> AppResult<()> {
    match decide(actor, action) {
        Decision::Allow => Ok(()),
        Decision::Deny(Deny::Unauthenticated) => Err(AppError::Unauthenticated),
        Decision::Deny(Deny::Forbidden) => Err(AppError::Forbidden),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(id: i32) -> Actor {
        Actor {
            id,
            username: format!("user{id}"),
            is_staff: false,
            is_superuser: false,
            groups: vec![USERS_GROUP.to_string()],
        }
    }

    fn staff(id: i32) -> Actor {
        Actor { is_staff: true, ..plain(id) }
    }

    fn moderator(id: i32) -> Actor {
        let mut a = plain(id);
        a.groups.push(MODERATORS_GROUP.to_string());
        a
    }

    #[test]
    fn registration_is_public() {
        assert_eq!(decide(None, Action::CreateUser), Decision::Allow);
        assert_eq!(decide(Some(&plain(1)), Action::CreateUser), Decision::Allow);
    }

    #[test]
    fn anonymous_is_unauthenticated_everywhere_else() {
        for action in [
            Action::ListUsers,
            Action::ReadUser { target: 1 },
            Action::ListGroups,
            Action::CreateReview,
            Action::RateMovie,
            Action::ToggleFavorite,
            Action::Moderate,
        ] {
            assert_eq!(decide(None, action), Decision::Deny(Deny::Unauthenticated));
        }
    }

    #[test]
    fn only_staff_lists_users() {
        assert_eq!(decide(Some(&plain(1)), Action::ListUsers), Decision::Deny(Deny::Forbidden));
        assert_eq!(decide(Some(&moderator(2)), Action::ListUsers), Decision::Deny(Deny::Forbidden));
        assert_eq!(decide(Some(&staff(3)), Action::ListUsers), Decision::Allow);
    }

    #[test]
    fn own_record_readable_and_updatable_but_never_deletable() {
        let a = plain(7);
        assert_eq!(decide(Some(&a), Action::ReadUser { target: 7 }), Decision::Allow);
        assert_eq!(decide(Some(&a), Action::UpdateUser { target: 7 }), Decision::Allow);
        assert_eq!(decide(Some(&a), Action::DeleteUser), Decision::Deny(Deny::Forbidden));
    }

    #[test]
    fn other_records_need_staff() {
        let a = plain(7);
        assert_eq!(
            decide(Some(&a), Action::ReadUser { target: 8 }),
            Decision::Deny(Deny::Forbidden)
        );
        assert_eq!(
            decide(Some(&a), Action::UpdateUser { target: 8 }),
            Decision::Deny(Deny::Forbidden)
        );
        let s = staff(1);
        assert_eq!(decide(Some(&s), Action::UpdateUser { target: 8 }), Decision::Allow);
        assert_eq!(decide(Some(&s), Action::DeleteUser), Decision::Allow);
    }

    #[test]
    fn group_mutation_is_staff_only() {
        assert_eq!(decide(Some(&plain(1)), Action::ListGroups), Decision::Allow);
        assert_eq!(decide(Some(&plain(1)), Action::MutateGroup), Decision::Deny(Deny::Forbidden));
        assert_eq!(decide(Some(&staff(2)), Action::MutateGroup), Decision::Allow);
    }

    #[test]
    fn review_edits_are_owner_or_moderator() {
        let owner = plain(5);
        assert_eq!(decide(Some(&owner), Action::EditReview { author: 5 }), Decision::Allow);
        assert_eq!(
            decide(Some(&owner), Action::EditReview { author: 6 }),
            Decision::Deny(Deny::Forbidden)
        );
        assert_eq!(decide(Some(&moderator(9)), Action::EditReview { author: 6 }), Decision::Allow);
        assert_eq!(
            decide(Some(&moderator(9)), Action::DeleteReview { author: 6 }),
            Decision::Allow
        );
    }

    #[test]
    fn superuser_counts_as_moderator() {
        let mut su = plain(4);
        su.is_superuser = true;
        assert_eq!(decide(Some(&su), Action::Moderate), Decision::Allow);
        assert_eq!(decide(Some(&su), Action::EditReview { author: 1 }), Decision::Allow);
    }

    #[test]
    fn moderation_surface_is_moderator_only() {
        assert_eq!(decide(Some(&plain(1)), Action::Moderate), Decision::Deny(Deny::Forbidden));
        assert_eq!(decide(Some(&staff(2)), Action::Moderate), Decision::Deny(Deny::Forbidden));
        assert_eq!(decide(Some(&moderator(3)), Action::Moderate), Decision::Allow);
    }

    #[test]
    fn profiles_are_self_or_moderator() {
        assert_eq!(decide(Some(&plain(1)), Action::ReadProfile { target: 1 }), Decision::Allow);
        assert_eq!(
            decide(Some(&plain(1)), Action::ReadProfile { target: 2 }),
            Decision::Deny(Deny::Forbidden)
        );
        assert_eq!(
            decide(Some(&moderator(3)), Action::ReadProfile { target: 2 }),
            Decision::Allow
        );
    }
}
