mod models;

pub use models::{
    ChangePasswordData, GoogleRegisterData, LoginData, RegisterData, Registration, TokenPair, User,
};
