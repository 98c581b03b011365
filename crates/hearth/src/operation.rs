use core::fmt;

/// An operation selected by an envelope action.
///
/// An action ending with `create`, `update` or `delete` selects the
/// corresponding mutation, so that `groups-create` and `create` both map to
/// [`Operation::Create`]. Every other action is a named operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation<'a> {
    /// Creates a resource.
    Create,
    /// Updates a resource.
    Update,
    /// Deletes a resource.
    Delete,
    /// Any other action, used verbatim.
    Named(&'a str),
}

impl fmt::Display for Operation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl<'a> Operation<'a> {
    /// All mutation operations along with their action suffix.
    const MUTATIONS: &'static [(&'static str, Operation<'static>)] = &[
        (Self::CREATE, Operation::Create),
        (Self::UPDATE, Operation::Update),
        (Self::DELETE, Operation::Delete),
    ];

    const CREATE: &'static str = "create";
    const UPDATE: &'static str = "update";
    const DELETE: &'static str = "delete";

    /// Classifies an action.
    #[must_use]
    pub fn parse(action: &'a str) -> Self {
        Self::MUTATIONS
            .iter()
            .find(|(suffix, _)| action.ends_with(suffix))
            .map_or(Self::Named(action), |(_, operation)| *operation)
    }

    /// Returns the key under which the operation is registered.
    #[must_use]
    pub const fn key(&self) -> &'a str {
        match *self {
            Self::Create => Self::CREATE,
            Self::Update => Self::UPDATE,
            Self::Delete => Self::DELETE,
            Self::Named(action) => action,
        }
    }

    /// Checks whether the operation mutates a resource.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        !matches!(self, Self::Named(_))
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use super::Operation;

    #[test]
    fn test_mutations() {
        assert_eq!(Operation::parse("create"), Operation::Create);
        assert_eq!(Operation::parse("groups-create"), Operation::Create);
        assert_eq!(Operation::parse("lightupdate"), Operation::Update);
        assert_eq!(Operation::parse("scenes/delete"), Operation::Delete);

        assert!(Operation::parse("update").is_mutation());
        assert_eq!(Operation::parse("groups/delete").key(), "delete");
    }

    #[test]
    fn test_named() {
        assert_eq!(Operation::parse("groups"), Operation::Named("groups"));
        assert_eq!(Operation::parse("created"), Operation::Named("created"));
        assert_eq!(Operation::parse(""), Operation::Named(""));

        let operation = Operation::parse("devices");
        assert!(!operation.is_mutation());
        assert_eq!(operation.key(), "devices");
        assert_eq!(operation.to_string(), "devices");
    }
}
