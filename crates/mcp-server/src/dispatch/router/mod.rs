pub(super) mod batch;
pub(super) mod catalog;
pub(super) mod governance;
pub(super) mod maintenance;
pub(super) mod records;
