mod balance;
mod helpers;
mod mocks;
