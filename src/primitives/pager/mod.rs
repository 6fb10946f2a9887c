#![forbid(unsafe_code)]

mod freelist;
mod meta;
mod pager;

pub use freelist::{
    read_free_page, write_free_page, FreeList, FreeListStore, FreeListUpdate, FreePage,
    FREE_PAGE_CAP, FREE_PAGE_HEADER,
};
pub use meta::{load_meta, read_meta_page, store_meta, write_meta_page, Meta, DB_SIG, META_LEN};
pub use pager::{Pager, PagerOptions, PagerStats, DEFAULT_INITIAL_MMAP_BYTES};
