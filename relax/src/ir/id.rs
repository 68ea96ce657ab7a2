use std::fmt;
use std::fmt::Display;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

static NEXT_INDEX: AtomicU64 = AtomicU64::new(0);

/// Identity of a variable.
///
/// Two variables with the same [Id] denote the same binding even when they
/// carry different struct info. Equality and hashing only look at the
/// index; the name hint is only used for printing.
#[derive(Clone, Debug)]
pub struct Id {
    index: u64,
    name_hint: Arc<str>,
}

impl Id {
    /// Allocate an identifier that is unique within this process.
    pub fn fresh(name_hint: &str) -> Id {
        let index = NEXT_INDEX.fetch_add(1, Ordering::Relaxed);
        Id {
            index,
            name_hint: Arc::from(name_hint),
        }
    }
    pub fn index(&self) -> u64 {
        self.index
    }
    pub fn name_hint(&self) -> &str {
        &self.name_hint
    }
}

impl PartialEq for Id {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for Id {}

impl Hash for Id {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name_hint)
    }
}

#[test]
fn test_fresh_ids_differ_by_index() {
    let a = Id::fresh("x");
    let b = Id::fresh("x");
    assert_ne!(a, b);
    assert_eq!(a, a.clone());
    assert_eq!(a.to_string(), "x");
}
