pub mod assignment_routes;
pub mod tag_routes;
pub mod user_routes;
pub mod vm_routes;
