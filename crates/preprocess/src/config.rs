/// Model input resolution `(width, height)` used when the model does not
/// declare a usable one.
pub const DEFAULT_INPUT_SIZE: (u32, u32) = (320, 320);
