use std::fmt;

macro_rules! actions {
    ($($variant:ident => $label:literal),+ $(,)?) => {
        /// Every action the dispatcher routes. Unknown names are rejected before any handler runs.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ActionKind {
            $($variant),+
        }

        impl ActionKind {
            pub const ALL: &'static [ActionKind] = &[$(ActionKind::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(ActionKind::$variant => $label),+
                }
            }

            pub fn parse(name: &str) -> Option<Self> {
                match name.trim() {
                    $($label => Some(ActionKind::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

actions! {
    Add => "add",
    Get => "get",
    List => "list",
    Remove => "remove",
    Update => "update",
    Diff => "diff",
    Export => "export",
    Search => "search",
    Query => "query",
    Categories => "categories",
    Import => "import",
    Batch => "batch",
    Groom => "groom",
    GovernanceHash => "governanceHash",
    GovernanceUpdate => "governanceUpdate",
    Reload => "reload",
    Invalidate => "invalidate",
    Dir => "dir",
    Health => "health",
    Capabilities => "capabilities",
}

impl ActionKind {
    /// Actions that always write. `groom` writes only outside dry-run and is gated separately.
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            ActionKind::Add
                | ActionKind::Remove
                | ActionKind::Update
                | ActionKind::Import
                | ActionKind::GovernanceUpdate
        )
    }

    pub fn names() -> Vec<String> {
        Self::ALL.iter().map(|a| a.as_str().to_string()).collect()
    }

    pub fn mutating_names() -> Vec<String> {
        let mut names: Vec<String> = Self::ALL
            .iter()
            .filter(|a| a.is_mutating())
            .map(|a| a.as_str().to_string())
            .collect();
        names.push(ActionKind::Groom.as_str().to_string());
        names.sort();
        names
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
