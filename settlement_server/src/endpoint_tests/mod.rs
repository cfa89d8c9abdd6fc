mod auth;
mod helpers;
mod ledger;
mod mocks;
mod wallets;
