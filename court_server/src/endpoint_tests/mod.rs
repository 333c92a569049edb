mod access;
mod cart;
mod helpers;
mod orders;
mod payments;
