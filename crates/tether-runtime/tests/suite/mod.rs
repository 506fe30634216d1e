mod bridge;
mod stepping;
mod threads;
