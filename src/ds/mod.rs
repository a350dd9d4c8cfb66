pub(crate) mod expiry_heap;
pub(crate) mod lru_list;

pub(crate) use expiry_heap::ExpiryHeap;
pub(crate) use lru_list::LruList;
