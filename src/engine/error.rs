use ulid::Ulid;

/// Programmer errors: a collaborator referenced something the board does not
/// contain, or an operation would break the total order. Never swallowed.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardError {
    UnknownItem(Ulid),
    UnknownContainer(Ulid),
    NotInContainer { item_id: Ulid, container_id: Ulid },
    IndexOutOfRange { container_id: Ulid, index: usize, len: usize },
    DuplicateItem(Ulid),
    DuplicateContainer(Ulid),
    LimitExceeded(&'static str),
    InvariantViolated(String),
}

impl std::fmt::Display for BoardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoardError::UnknownItem(id) => write!(f, "unknown item: {id}"),
            BoardError::UnknownContainer(id) => write!(f, "unknown container: {id}"),
            BoardError::NotInContainer {
                item_id,
                container_id,
            } => write!(f, "item {item_id} is not in container {container_id}"),
            BoardError::IndexOutOfRange {
                container_id,
                index,
                len,
            } => write!(
                f,
                "index {index} out of range for container {container_id} of length {len}"
            ),
            BoardError::DuplicateItem(id) => write!(f, "duplicate item: {id}"),
            BoardError::DuplicateContainer(id) => write!(f, "duplicate container: {id}"),
            BoardError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            BoardError::InvariantViolated(msg) => write!(f, "invariant violated: {msg}"),
        }
    }
}

impl std::error::Error for BoardError {}
