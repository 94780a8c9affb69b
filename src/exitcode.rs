//! Process exit codes used by the `outliner` binary (BSD sysexits.h values)

/// Bad arguments or an unresolvable item reference
pub const USAGE: i32 = 64;

/// World fixture could not be parsed or built
pub const DATAERR: i32 = 65;

/// World fixture file missing
pub const NOINPUT: i32 = 66;

/// Engine refused or failed an operation
pub const SOFTWARE: i32 = 70;

/// Reading a fixture or config file failed
pub const IOERR: i32 = 74;

/// Settings could not be loaded
pub const CONFIG: i32 = 78;
