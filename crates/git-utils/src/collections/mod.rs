pub mod hashmap;
pub mod prio_queue;
pub mod string_list;
