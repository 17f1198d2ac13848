//! Status helper enums mapping to SMALLINT lookup tables.
//!
//! Each variant's discriminant matches the seed row id in the
//! corresponding `*_statuses` table.

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Lookup-table name (`run_statuses.name`).
            pub fn name(self) -> &'static str {
                match self {
                    $( $name::$variant => $label ),+
                }
            }

            pub fn from_id(id: StatusId) -> Option<Self> {
                Self::ALL.iter().copied().find(|s| s.id() == id)
            }

            /// Case-insensitive lookup by name (`"failed"`, `"FAILED"`).
            pub fn from_name(name: &str) -> Option<Self> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|s| s.name().eq_ignore_ascii_case(name))
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Automation Run status. Transitions only forward:
    /// `Queued -> Running -> {Succeeded, Skipped, Failed}`. Gate-time skips
    /// are created directly as `Skipped`.
    RunStatus {
        Queued = 1 => "queued",
        Running = 2 => "running",
        Succeeded = 3 => "succeeded",
        Skipped = 4 => "skipped",
        Failed = 5 => "failed",
    }
}

impl RunStatus {
    /// Statuses that still count as in flight for the insert guard.
    pub const LIVE: [RunStatus; 2] = [RunStatus::Queued, RunStatus::Running];

    pub fn is_terminal(self) -> bool {
        !Self::LIVE.contains(&self)
    }

    /// Upper-case label used in API payloads (`"SUCCEEDED"`).
    pub fn label(self) -> String {
        self.name().to_ascii_uppercase()
    }
}
