mod identity;
mod thread_control;
