/// Readiness a registration waits for.
///
/// A connection only ever waits on one direction at a time: the head
/// operation decides whether the socket must become readable or writable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
}
