//! Archive listing functionality

use crate::archive::ArchiveHandle;
use crate::entry::{ArchiveEntry, select_entries};
use crate::utils::format_size;

/// Totals printed under a listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListingTotals {
    pub files: usize,
    pub bytes: u64,
}

/// Entries an extraction with `filter` would write, with their totals.
pub fn list_entries(
    archive: &dyn ArchiveHandle,
    filter: Option<&str>,
) -> (Vec<ArchiveEntry>, ListingTotals) {
    let entries = select_entries(archive.entries(), filter);
    let totals = ListingTotals {
        files: entries.len(),
        bytes: entries.iter().map(|e| e.size).sum(),
    };
    (entries, totals)
}

/// Print the entries an extraction with `filter` would write.
pub fn list_contents(archive: &dyn ArchiveHandle, filter: Option<&str>) -> ListingTotals {
    let (entries, totals) = list_entries(archive, filter);

    println!("{:>10}  {}", "Size", "Name");
    println!("{:->10}  {:->40}", "", "");

    for entry in &entries {
        println!("{:>10}  {}", format_size(entry.size), entry.key);
    }

    println!("{:->10}  {:->40}", "", "");
    println!("{:>10}  {} files", format_size(totals.bytes), totals.files);

    totals
}
