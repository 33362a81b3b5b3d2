// Color handling shared by the group controls, the transition scheduler and
// the command line tool.
pub mod color;
