// CLI Commands

pub mod expand;
pub mod submit;
pub mod substitute;
