//! Per-kind tally of document symbols.

use std::collections::BTreeMap;

use gosandbox_types::SymbolKind;

use crate::protocol::DocumentSymbol;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolStats {
    counts: BTreeMap<u64, usize>,
}

impl SymbolStats {
    /// Count top-level symbols by kind. Unknown kinds are ignored.
    #[must_use]
    pub fn count(symbols: &[DocumentSymbol]) -> Self {
        let mut counts = BTreeMap::new();
        for symbol in symbols {
            if symbol.symbol_kind().is_some() {
                *counts.entry(symbol.kind).or_insert(0) += 1;
            }
        }
        Self { counts }
    }

    #[must_use]
    pub fn get(&self, kind: SymbolKind) -> usize {
        SymbolKind::ALL
            .iter()
            .position(|k| *k == kind)
            .and_then(|index| self.counts.get(&(index as u64 + 1)))
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Non-zero counts in protocol order.
    pub fn iter(&self) -> impl Iterator<Item = (SymbolKind, usize)> + '_ {
        self.counts
            .iter()
            .filter_map(|(kind, count)| SymbolKind::from_lsp(*kind).map(|k| (k, *count)))
    }
}
