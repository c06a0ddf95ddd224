pub(crate) mod builtin;
pub(crate) mod compiler;
pub(crate) mod dictionary;
pub(crate) mod general;
pub(crate) mod image;
pub(crate) mod inner;
