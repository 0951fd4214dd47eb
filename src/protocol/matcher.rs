//! Pairing own cats with peer options.

use super::intent::{Cat, PeerIntent, Side};

/// Anything with a side and a form can take part in matching.
pub trait Matchable {
    /// Role polarity.
    fn side(&self) -> Side;
    /// Exchange form.
    fn form(&self) -> &str;
}

impl Matchable for Cat {
    fn side(&self) -> Side {
        Cat::side(self)
    }

    fn form(&self) -> &str {
        Cat::form(self)
    }
}

impl Matchable for PeerIntent {
    fn side(&self) -> Side {
        self.side
    }

    fn form(&self) -> &str {
        &self.form
    }
}

/// Whether `own` and `peer` may be paired: opposite sides, identical form
/// (case-sensitive).
pub fn is_eligible<A: Matchable + ?Sized, B: Matchable + ?Sized>(own: &A, peer: &B) -> bool {
    own.side() != peer.side() && own.form() == peer.form()
}

/// Find the pairing to use.
///
/// Scans own entries in order and, for each, peer options in order; the
/// last eligible pairing seen wins. So among several eligible own entries
/// the one declared last is chosen, and for it the last eligible peer
/// option. Both parties apply the same rule to their own inputs, so they
/// agree without coordinating.
// TODO: replace "last wins" with an explicit priority rule; requester and
// service have to switch in the same release or they stop agreeing.
pub fn find_match<'a, 'b, A: Matchable, B: Matchable>(
    own: &'a [A],
    peers: &'b [B],
) -> Option<(&'a A, &'b B)> {
    let mut found = None;
    for candidate in own {
        for option in peers {
            if is_eligible(candidate, option) {
                found = Some((candidate, option));
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry {
        id: usize,
        side: Side,
        form: String,
    }

    impl Matchable for Entry {
        fn side(&self) -> Side {
            self.side
        }
        fn form(&self) -> &str {
            &self.form
        }
    }

    fn entry(id: usize, side: Side, form: &str) -> Entry {
        Entry {
            id,
            side,
            form: form.to_string(),
        }
    }

    #[test]
    fn test_later_own_entry_wins() {
        let own = [entry(0, Side::Accepting, "f"), entry(1, Side::Accepting, "f")];
        let peers = [entry(10, Side::Offering, "f")];

        let (chosen, option) = find_match(&own, &peers).unwrap();
        assert_eq!(chosen.id, 1);
        assert_eq!(option.id, 10);
    }

    #[test]
    fn test_later_peer_option_wins() {
        let own = [entry(0, Side::Offering, "f")];
        let peers = [
            entry(10, Side::Accepting, "f"),
            entry(11, Side::Accepting, "g"),
            entry(12, Side::Accepting, "f"),
        ];

        let (_, option) = find_match(&own, &peers).unwrap();
        assert_eq!(option.id, 12);
    }

    #[test]
    fn test_same_side_never_matches() {
        let own = [entry(0, Side::Offering, "f")];
        let peers = [entry(10, Side::Offering, "f")];
        assert!(find_match(&own, &peers).is_none());
    }

    #[test]
    fn test_form_is_case_sensitive() {
        let own = [entry(0, Side::Offering, "Text")];
        let peers = [entry(10, Side::Accepting, "text")];
        assert!(find_match(&own, &peers).is_none());
    }

    #[test]
    fn test_empty_inputs() {
        let none: [Entry; 0] = [];
        assert!(find_match(&none, &[entry(0, Side::Offering, "f")]).is_none());
        assert!(find_match(&[entry(0, Side::Offering, "f")], &none).is_none());
    }

    fn arb_entries() -> impl Strategy<Value = Vec<Entry>> {
        prop::collection::vec(
            (any::<bool>(), prop::sample::select(vec!["a", "b", "c"])),
            0..6,
        )
        .prop_map(|specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(id, (accepting, form))| {
                    let side = if accepting {
                        Side::Accepting
                    } else {
                        Side::Offering
                    };
                    entry(id, side, form)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_match_is_last_eligible_in_scan_order(own in arb_entries(), peers in arb_entries()) {
            let expected = own
                .iter()
                .flat_map(|a| peers.iter().map(move |b| (a, b)))
                .filter(|(a, b)| is_eligible(*a, *b))
                .last()
                .map(|(a, b)| (a.id, b.id));

            let actual = find_match(&own, &peers).map(|(a, b)| (a.id, b.id));
            prop_assert_eq!(actual, expected);
        }

        #[test]
        fn prop_no_eligible_pair_means_none(own in arb_entries(), peers in arb_entries()) {
            let any_eligible = own.iter().any(|a| peers.iter().any(|b| is_eligible(a, b)));
            prop_assert_eq!(find_match(&own, &peers).is_some(), any_eligible);
        }
    }
}
