pub mod realtime;
pub mod supabase;

pub use realtime::{RealtimeClient, RealtimeFrame, RealtimeSubscription};
pub use supabase::{is_conflict, DatabaseError, SupabaseClient};
