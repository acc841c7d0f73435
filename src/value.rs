//! The `Link` type from §9's design notes: a tagged variant rather than an
//! arbitrarily-nested array, because the nesting depth of list-of-list
//! return types isn't known statically.

use crate::keys::EntityKey;

/// The relationship from a parent field-key to its child entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    Key(EntityKey),
    Null,
    List(Vec<Link>),
}

impl Link {
    pub fn is_null(&self) -> bool {
        matches!(self, Link::Null)
    }

    /// Depth-first iterator over every entity key reachable through this
    /// link, skipping nulls. Used by invalidation logic that wants the flat
    /// set of entities a link currently touches.
    pub fn keys(&self) -> Vec<&EntityKey> {
        let mut out = Vec::new();
        self.collect_keys(&mut out);
        out
    }

    fn collect_keys<'a>(&'a self, out: &mut Vec<&'a EntityKey>) {
        match self {
            Link::Key(key) => out.push(key),
            Link::Null => {}
            Link::List(items) => {
                for item in items {
                    item.collect_keys(out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_flattens_nested_lists() {
        let link = Link::List(vec![
            Link::Key("Todo:1".into()),
            Link::Null,
            Link::List(vec![Link::Key("Todo:2".into()), Link::Null]),
        ]);
        assert_eq!(link.keys(), vec!["Todo:1", "Todo:2"]);
    }
}
