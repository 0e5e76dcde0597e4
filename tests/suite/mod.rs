mod apply;
mod session;
mod tool;
