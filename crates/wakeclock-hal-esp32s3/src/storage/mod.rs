pub mod flash_credentials;
