pub mod picker;
pub mod reference_picker;
pub mod star_writer;

pub use picker::Picker;
pub use reference_picker::ReferencePicker;
pub use star_writer::{Particle, StarWriter};
