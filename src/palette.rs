extern crate alloc;
use alloc::vec::Vec;

use rgb::RGBA8;

use crate::bins::BinArena;

/// An ordered output color table.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    entries: Vec<RGBA8>,
    /// Transparent index, if any. Always 0 when present.
    transparent_index: Option<u16>,
}

impl Palette {
    /// Emit one entry per surviving bin, walking the active list from its root.
    ///
    /// When `transparent` is given, the pinned bin is written as exactly that color (low
    /// alpha pixels can share its cell) and swapped into index 0.
    pub fn from_active_bins(arena: &BinArena, transparent: Option<RGBA8>) -> Self {
        let entries = arena
            .active_bins()
            .map(|handle| {
                let bin = &arena.bins()[handle];
                match transparent {
                    Some(t) if bin.pinned => t,
                    _ => bin.color(arena.with_alpha()),
                }
            })
            .collect();
        Self::from_entries(entries, transparent)
    }

    /// Build a palette from explicit colors, placing `transparent` at index 0 if it is
    /// among them.
    pub fn from_entries(mut entries: Vec<RGBA8>, transparent: Option<RGBA8>) -> Self {
        let transparent_index = transparent.and_then(|t| {
            let k = entries.iter().position(|&e| e == t)?;
            entries.swap(0, k);
            Some(0)
        });
        Self {
            entries,
            transparent_index,
        }
    }

    pub fn entries(&self) -> &[RGBA8] {
        &self.entries
    }

    /// Get transparent index, if any.
    pub fn transparent_index(&self) -> Option<u16> {
        self.transparent_index
    }

    /// Number of palette entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the palette is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: u16) -> Option<RGBA8> {
        self.entries.get(index as usize).copied()
    }

    /// Alpha values for a PNG tRNS chunk, truncated after the last non-opaque entry.
    /// `None` if every entry is opaque.
    pub fn alpha_table(&self) -> Option<Vec<u8>> {
        let last_non_opaque = self.entries.iter().rposition(|e| e.a != u8::MAX)?;
        Some(self.entries[..=last_non_opaque].iter().map(|e| e.a).collect())
    }
}
